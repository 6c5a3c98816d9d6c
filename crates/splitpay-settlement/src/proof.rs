//! Proof of settlement.
//!
//! The proof binds a settlement to the escrow withdrawal and the fiat payout
//! that completed it: `BLAKE3(settlement_id || crypto_tx_hash || fiat_tx_ref)`
//! with each field length-prefixed, hex-encoded.

use splitpay_core::SettlementId;

/// Compute the hex-encoded proof hash for a completed settlement.
pub fn proof_hash(settlement_id: SettlementId, crypto_tx_hash: &str, fiat_tx_ref: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    for field in [
        settlement_id.as_uuid().as_bytes().as_slice(),
        crypto_tx_hash.as_bytes(),
        fiat_tx_ref.as_bytes(),
    ] {
        hasher.update(&(field.len() as u64).to_le_bytes());
        hasher.update(field);
    }
    hex::encode(hasher.finalize().as_bytes())
}

/// Check a recorded proof against the references it should commit to.
pub fn verify_proof(
    settlement_id: SettlementId,
    crypto_tx_hash: &str,
    fiat_tx_ref: &str,
    proof: &str,
) -> bool {
    proof_hash(settlement_id, crypto_tx_hash, fiat_tx_ref) == proof
}
