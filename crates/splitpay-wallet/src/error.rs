use splitpay_core::{Chain, CollaboratorError, CoreError, ErrorKind, WalletId};

/// Errors raised by the wallet ledger.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("wallet already registered: {address} on {chain}")]
    DuplicateWallet { chain: Chain, address: String },

    #[error("wallet not found: {0}")]
    WalletNotFound(WalletId),

    #[error("balance provider unavailable for wallet {wallet_id}: {source}")]
    ProviderUnavailable {
        wallet_id: WalletId,
        #[source]
        source: CollaboratorError,
    },

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DuplicateWallet { .. } => ErrorKind::Validation,
            Self::WalletNotFound(_) => ErrorKind::Validation,
            Self::ProviderUnavailable { .. } => ErrorKind::ProviderUnavailable,
            Self::Core(err) => err.kind(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ProviderUnavailable { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}
