//! Hash computation for cross-chain message IDs
//!
//! Message IDs use a compact `abi.encodePacked`-style layout so that any
//! observer holding the source instance's identity and nonce can recompute
//! them:
//!
//! ```solidity
//! keccak256(abi.encodePacked(srcChain, srcContract, destChain, nonce))
//! ```

use alloy_primitives::Address;
use tiny_keccak::{Hasher, Keccak};

use crate::types::{ChainId, MessageId};

/// Compute keccak256 hash of data
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut output = [0u8; 32];
    hasher.finalize(&mut output);
    output
}

/// Compute the ID of the `nonce`-th message sent by `src_contract` on `src_chain`
pub fn compute_message_id(
    src_chain: &ChainId,
    src_contract: &Address,
    dest_chain: &ChainId,
    nonce: u64,
) -> MessageId {
    // layout: 4 + 20 + 4 + 8 = 36 bytes
    let mut data = [0u8; 36];

    data[0..4].copy_from_slice(src_chain.as_bytes());
    data[4..24].copy_from_slice(src_contract.as_slice());
    data[24..28].copy_from_slice(dest_chain.as_bytes());
    data[28..36].copy_from_slice(&nonce.to_be_bytes());

    MessageId(keccak256(&data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak256_empty() {
        // Well-known keccak256 of the empty string
        let hash = keccak256(b"");
        assert_eq!(
            hex::encode(hash),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_message_id_deterministic() {
        let contract = Address::repeat_byte(0x11);
        let a = compute_message_id(&ChainId::from_u32(1), &contract, &ChainId::from_u32(2), 0);
        let b = compute_message_id(&ChainId::from_u32(1), &contract, &ChainId::from_u32(2), 0);
        assert_eq!(a, b);
    }

    #[test]
    fn test_message_id_changes_with_every_field() {
        let contract = Address::repeat_byte(0x11);
        let base = compute_message_id(&ChainId::from_u32(1), &contract, &ChainId::from_u32(2), 0);

        let other_nonce =
            compute_message_id(&ChainId::from_u32(1), &contract, &ChainId::from_u32(2), 1);
        let other_src =
            compute_message_id(&ChainId::from_u32(3), &contract, &ChainId::from_u32(2), 0);
        let other_dest =
            compute_message_id(&ChainId::from_u32(1), &contract, &ChainId::from_u32(4), 0);
        let other_contract = compute_message_id(
            &ChainId::from_u32(1),
            &Address::repeat_byte(0x22),
            &ChainId::from_u32(2),
            0,
        );

        assert_ne!(base, other_nonce);
        assert_ne!(base, other_src);
        assert_ne!(base, other_dest);
        assert_ne!(base, other_contract);
    }
}
