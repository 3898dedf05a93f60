//! Receipt folding.
//!
//! A receipt proves `start` reaches `anchor` through an ordered sequence of
//! sibling folds: `next = right ? H(acc ∥ sib) : H(sib ∥ acc)`. The domain
//! is SHA-256 throughout.

use crosslink_crypto::hash::sha256_pair;
use crosslink_types::error::{ProofError, ProofLayer};
use crosslink_types::proof::Receipt;
use crosslink_types::Hash32;

/// Re-folds `start` through the entries and returns the resulting root.
pub fn fold(receipt: &Receipt) -> Hash32 {
    let mut acc = receipt.start;
    for step in &receipt.entries {
        acc = if step.right {
            sha256_pair(&acc, &step.hash)
        } else {
            sha256_pair(&step.hash, &acc)
        };
    }
    acc
}

/// Checks the receipt re-folds to its stored anchor.
pub fn verify(receipt: &Receipt, layer: ProofLayer, stage: &'static str) -> Result<(), ProofError> {
    let got = fold(receipt);
    if got != receipt.anchor {
        return Err(ProofError::ReceiptIntegrity {
            layer,
            stage,
            expected: receipt.anchor,
            got,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crosslink_crypto::hash::sha256;
    use crosslink_types::proof::ReceiptStep;

    fn receipt_from(start: Hash32, steps: &[(Hash32, bool)]) -> Receipt {
        let entries: Vec<ReceiptStep> = steps
            .iter()
            .map(|(hash, right)| ReceiptStep {
                hash: *hash,
                right: *right,
            })
            .collect();
        let mut r = Receipt {
            start,
            anchor: Hash32::ZERO,
            local_block: 1,
            entries,
        };
        r.anchor = fold(&r);
        r
    }

    #[test]
    fn folds_to_expected_anchor() {
        // start = H("a"), siblings H("b") right, H("c") left, H("d") right.
        let r = receipt_from(
            sha256(b"a"),
            &[
                (sha256(b"b"), true),
                (sha256(b"c"), false),
                (sha256(b"d"), true),
            ],
        );

        let step1 = sha256_pair(&sha256(b"a"), &sha256(b"b"));
        let step2 = sha256_pair(&sha256(b"c"), &step1);
        let expected = sha256_pair(&step2, &sha256(b"d"));
        assert_eq!(r.anchor, expected);
        assert!(verify(&r, ProofLayer::Layer1, "receipt").is_ok());
    }

    #[test]
    fn any_mutation_breaks_the_fold() {
        let r = receipt_from(
            sha256(b"a"),
            &[
                (sha256(b"b"), true),
                (sha256(b"c"), false),
                (sha256(b"d"), true),
            ],
        );

        for i in 0..r.entries.len() {
            // Flip a byte of the sibling hash.
            let mut tampered = r.clone();
            tampered.entries[i].hash.0[0] ^= 0x01;
            assert!(verify(&tampered, ProofLayer::Layer1, "receipt").is_err());

            // Flip the side bit.
            let mut flipped = r.clone();
            flipped.entries[i].right = !flipped.entries[i].right;
            assert!(verify(&flipped, ProofLayer::Layer1, "receipt").is_err());
        }
    }

    #[test]
    fn empty_receipt_folds_to_start() {
        let start = sha256(b"leaf");
        let r = Receipt {
            start,
            anchor: start,
            local_block: 0,
            entries: vec![],
        };
        assert!(verify(&r, ProofLayer::Layer1, "receipt").is_ok());
    }
}
