use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvolutionError {
    #[error(transparent)]
    Storage(#[from] barnabee_storage::StorageError),
    #[error(transparent)]
    Nlu(#[from] barnabee_nlu::NluError),
    #[error("pipeline lock is held by another run")]
    LockContended,
    #[error("golden dataset has fewer than {0} cases")]
    GoldenDatasetTooSmall(usize),
}

pub type EvolutionResult<T> = Result<T, EvolutionError>;
