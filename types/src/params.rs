//! Ledger parameters.

use crate::address::Address;
use crate::amount::DECIMALS;
use serde::{Deserialize, Serialize};

/// Tunable parameters of a voucher ledger instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerParams {
    /// The ledger's own identity. Paying out to it would strand funds in
    /// the pool, so it is rejected as a spend or tip target.
    #[serde(default = "default_ledger_address")]
    pub ledger_address: Address,

    /// Upper bound on the number of agents in one `create_batch` call.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Decimal precision of the funded asset (display only).
    #[serde(default = "default_decimals")]
    pub decimals: u32,
}

fn default_ledger_address() -> Address {
    // 0xD812EA3A821A5b4d835bfA06BAf542138e434D48
    Address::new([
        0xd8, 0x12, 0xea, 0x3a, 0x82, 0x1a, 0x5b, 0x4d, 0x83, 0x5b, 0xfa, 0x06, 0xba, 0xf5,
        0x42, 0x13, 0x8e, 0x43, 0x4d, 0x48,
    ])
}

fn default_max_batch_size() -> usize {
    256
}

fn default_decimals() -> u32 {
    DECIMALS
}

impl Default for LedgerParams {
    fn default() -> Self {
        Self {
            ledger_address: default_ledger_address(),
            max_batch_size: default_max_batch_size(),
            decimals: default_decimals(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ledger_address_matches_deployment() {
        assert_eq!(
            LedgerParams::default().ledger_address.to_string(),
            "0xd812ea3a821a5b4d835bfa06baf542138e434d48"
        );
    }
}
