use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Result, Warning};
use crate::renderer::Render;

pub const DEFAULT_MAX_ROUNDS: usize = 25;
pub const DEFAULT_SETTLE: Duration = Duration::from_secs(1);

/// What one full-disclosure pass did.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExpansionStats {
    pub rounds: usize,
    pub activations: usize,
    pub failures: usize,
    /// False when the round cap was hit with controls still appearing.
    pub converged: bool,
}

/// Activate every visible disclosure control, re-querying after each round,
/// until a round finds none. Already-expanded pages terminate on the first
/// round with zero activations.
///
/// Each activation may fail independently (the control went stale between
/// query and click); failures are logged as warnings and skipped without
/// aborting the round. The round cap keeps a page whose controls respawn on
/// every click from looping forever: hitting it gives up and reports
/// non-convergence instead.
pub async fn expand_fully<R: Render>(
    renderer: &mut R,
    max_rounds: usize,
    settle: Duration,
    warnings: &mut Vec<Warning>,
) -> Result<ExpansionStats> {
    let mut stats = ExpansionStats::default();

    while stats.rounds < max_rounds {
        let controls = renderer.expand_controls().await?;
        if controls.is_empty() {
            stats.converged = true;
            debug!(
                "Expansion converged after {} rounds / {} activations",
                stats.rounds, stats.activations
            );
            return Ok(stats);
        }
        stats.rounds += 1;

        for control in &controls {
            match renderer.activate(control).await {
                Ok(()) => {
                    stats.activations += 1;
                    // Let the disclosed content attach before the next click.
                    tokio::time::sleep(settle).await;
                }
                Err(e) => {
                    stats.failures += 1;
                    warn!("Could not activate expand control: {}", e);
                    warnings.push(Warning::ControlActivation(e.to_string()));
                }
            }
        }
    }

    warn!(
        "Expansion did not converge within {} rounds ({} activations)",
        max_rounds, stats.activations
    );
    warnings.push(Warning::ExpansionNotConverged {
        rounds: stats.rounds,
    });
    Ok(stats)
}

// ── Tests ──
