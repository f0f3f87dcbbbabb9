/// Decides whether a run should stop before its configured epoch count.
pub trait EarlyStoppingPolicy: Send + Sync {
    fn should_stop(&self, validation_losses: &[f64], patience: usize) -> bool;
}

/// Stops once the last `patience` validation losses never improve: each entry is
/// greater than or equal to the one before it. A flat window counts as no improvement.
///
/// There is no smoothing, so a single noisy epoch inside the window resets the check.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlateauEarlyStopping;

impl EarlyStoppingPolicy for PlateauEarlyStopping {
    fn should_stop(&self, validation_losses: &[f64], patience: usize) -> bool {
        if patience == 0 || validation_losses.len() < patience {
            return false;
        }
        let window = &validation_losses[validation_losses.len() - patience..];
        window.windows(2).all(|pair| pair[1] >= pair[0])
    }
}
