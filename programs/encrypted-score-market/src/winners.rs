/// Decides which decrypted predictions win a finalized batch.
pub trait WinnerPolicy {
    fn count_winners(&self, actual_score: u32, predictions: &[u32]) -> u64;
}

/// A prediction wins when it lands within `tolerance` of the actual score.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WithinTolerance {
    pub tolerance: u32,
}

impl WithinTolerance {
    pub fn new(tolerance: u32) -> Self {
        Self { tolerance }
    }

    pub fn is_winner(&self, actual_score: u32, predicted: u32) -> bool {
        actual_score.abs_diff(predicted) <= self.tolerance
    }
}

impl WinnerPolicy for WithinTolerance {
    fn count_winners(&self, actual_score: u32, predictions: &[u32]) -> u64 {
        predictions
            .iter()
            .filter(|&&p| self.is_winner(actual_score, p))
            .count() as u64
    }
}
