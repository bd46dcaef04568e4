//! Iterative brute-force refinement around the one-shot optimizer.
//!
//! Each iteration runs the materializer, measures the RTP error, and rescales
//! the RTP handed to auto buckets by `target / current`. Progress events go
//! to a bounded channel with `try_send`: a full channel drops the event and
//! the search keeps computing. The stop flag is checked between iterations;
//! on stop the run returns `Cancelled` and no partial weight vector escapes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;

use crate::error::OptimizerError;
use crate::model::LookupTable;
use crate::optimizer::result::{BruteForceProgress, BruteForceResult, SearchPhase};
use crate::optimizer::{BucketOptimizer, OptimizeResult, OptimizerConfig};

/// Bounded progress channel capacity; enough that a slow consumer only loses
/// intermediate events, never the terminal one (which rides the result path).
pub const PROGRESS_CHANNEL_CAPACITY: usize = 100;

const MIN_AUTO_SCALE: f64 = 0.05;
const MAX_AUTO_SCALE: f64 = 20.0;

pub struct BruteForceOptimizer {
    optimizer: BucketOptimizer,
    target_rtp: f64,
    rtp_tolerance: f64,
    max_iterations: usize,
    progress: Option<mpsc::Sender<BruteForceProgress>>,
    stop: Option<Arc<AtomicBool>>,
}

impl BruteForceOptimizer {
    pub fn new(config: OptimizerConfig, progress: Option<mpsc::Sender<BruteForceProgress>>) -> Self {
        Self::with_stop(config, progress, None)
    }

    pub fn with_stop(
        config: OptimizerConfig,
        progress: Option<mpsc::Sender<BruteForceProgress>>,
        stop: Option<Arc<AtomicBool>>,
    ) -> Self {
        let config = config.normalized();
        let target_rtp = config.target_rtp;
        let rtp_tolerance = config.rtp_tolerance;
        let max_iterations = config.max_iterations;
        Self {
            optimizer: BucketOptimizer::new(config),
            target_rtp,
            rtp_tolerance,
            max_iterations,
            progress,
            stop,
        }
    }

    fn stopped(&self) -> bool {
        self.stop
            .as_ref()
            .map(|s| s.load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    fn emit(&self, progress: BruteForceProgress) {
        if let Some(tx) = &self.progress {
            // Best-effort: drop on a full channel, keep computing.
            let _ = tx.try_send(progress);
        }
    }

    /// Run the search. Synchronous and CPU-bound; callers on the request path
    /// should wrap it in `spawn_blocking`.
    pub fn optimize_table(
        &self,
        table: &LookupTable,
    ) -> Result<BruteForceResult, OptimizerError> {
        let start = Instant::now();
        let mut auto_scale = 1.0f64;
        let mut best: Option<OptimizeResult> = None;
        let mut best_error = f64::MAX;
        let mut iterations = 0usize;

        for iteration in 0..self.max_iterations {
            if self.stopped() {
                return Err(OptimizerError::Cancelled);
            }
            iterations = iteration + 1;

            let result = self.optimizer.optimize_table_scaled(table, auto_scale)?;
            let current_rtp = result.final_rtp;
            let error = (current_rtp - self.target_rtp).abs();
            let converged = result.converged;

            self.emit(BruteForceProgress {
                phase: SearchPhase::Search,
                iteration,
                max_iter: self.max_iterations,
                current_rtp,
                target_rtp: self.target_rtp,
                error,
                converged,
                elapsed_ms: start.elapsed().as_millis() as u64,
            });

            if error < best_error {
                best_error = error;
                best = Some(result);
            }

            if converged {
                // One refine pass: the materializer already fine-tuned the
                // loss weight; report the phase and settle.
                self.emit(BruteForceProgress {
                    phase: SearchPhase::Refine,
                    iteration,
                    max_iter: self.max_iterations,
                    current_rtp,
                    target_rtp: self.target_rtp,
                    error,
                    converged: true,
                    elapsed_ms: start.elapsed().as_millis() as u64,
                });
                break;
            }

            if current_rtp > 0.0 {
                auto_scale = (auto_scale * self.target_rtp / current_rtp)
                    .clamp(MIN_AUTO_SCALE, MAX_AUTO_SCALE);
            }
        }

        if self.stopped() {
            return Err(OptimizerError::Cancelled);
        }

        let Some(result) = best else {
            return Err(OptimizerError::InvalidRequest(
                "max_iterations must be at least 1".into(),
            ));
        };
        let final_error = (result.final_rtp - self.target_rtp).abs();

        self.emit(BruteForceProgress {
            phase: SearchPhase::Complete,
            iteration: iterations,
            max_iter: self.max_iterations,
            current_rtp: result.final_rtp,
            target_rtp: self.target_rtp,
            error: final_error,
            converged: result.converged,
            elapsed_ms: start.elapsed().as_millis() as u64,
        });

        Ok(BruteForceResult {
            result,
            iterations,
            search_duration_ms: start.elapsed().as_millis() as u64,
            final_error,
        })
    }
}
