//! Storage deposit: the base tokens an output must lock for the bytes it
//! occupies on every node.
//!
//! ```text
//! deposit = v_byte_cost * (factor_key * 34 + factor_data * (packed_len + 40))
//! ```
//!
//! The key part covers the output id a node indexes it by, the data part
//! covers the output itself plus the metadata a node keeps next to it.

use serde::{Deserialize, Serialize};

use super::Output;
use crate::block::packable::Packable;
use crate::config::{
    DEFAULT_V_BYTE_COST, DEFAULT_V_BYTE_FACTOR_DATA, DEFAULT_V_BYTE_FACTOR_KEY,
    OUTPUT_ID_LENGTH, OUTPUT_METADATA_LENGTH,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RentStructure {
    pub v_byte_cost: u32,
    pub v_byte_factor_key: u8,
    pub v_byte_factor_data: u8,
}

impl Default for RentStructure {
    fn default() -> Self {
        Self {
            v_byte_cost: DEFAULT_V_BYTE_COST,
            v_byte_factor_key: DEFAULT_V_BYTE_FACTOR_KEY,
            v_byte_factor_data: DEFAULT_V_BYTE_FACTOR_DATA,
        }
    }
}

impl RentStructure {
    /// Deposit for an output that packs to `packed_len` bytes.
    pub fn deposit_for_packed_len(&self, packed_len: usize) -> u64 {
        let key = self.v_byte_factor_key as u64 * OUTPUT_ID_LENGTH as u64;
        let data =
            self.v_byte_factor_data as u64 * (packed_len as u64 + OUTPUT_METADATA_LENGTH as u64);
        self.v_byte_cost as u64 * (key + data)
    }

    pub fn minimum_deposit(&self, output: &Output) -> u64 {
        self.deposit_for_packed_len(output.packed_len())
    }
}
