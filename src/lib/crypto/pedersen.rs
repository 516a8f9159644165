use alloy::primitives::{
    B256,
    U256,
};
use ark_ff::MontFp;

use super::{
    babyjub::{
        Point,
        SUBGROUP_ORDER,
    },
    fr_to_b256,
};

const WINDOW_BITS: usize = 4;
const WINDOWS_PER_SEGMENT: usize = 50;
const SEGMENT_BITS: usize = WINDOW_BITS * WINDOWS_PER_SEGMENT;

/// Per-segment generators: `8 * P_i`, where `P_i` is the first point decoded
/// from `blake256("PedersenGenerator_<i>_<try>")` with i and try padded to 32 digits.
const GENERATORS: [Point; 3] = [
    Point {
        x: MontFp!("10457101036533406547632367118273992217979173478358440826365724437999023779287"),
        y: MontFp!("19824078218392094440610104313265183977899662750282163392862422243483260492317"),
    },
    Point {
        x: MontFp!("2671756056509184035029146175565761955751135805354291559563293617232983272177"),
        y: MontFp!("2663205510731142763556352975002641716101654201788071096152948830924149045094"),
    },
    Point {
        x: MontFp!("5802099305472655231388284418920769829666717045250560929368476121199858275951"),
        y: MontFp!("5980429700218124965372158798884772646841287887664001482443826541541529227896"),
    },
];

/// Longest preimage the generator table covers.
pub const MAX_PREIMAGE_BYTES: usize = SEGMENT_BITS * GENERATORS.len() / 8;

/// Baby Jubjub Pedersen hash of `preimage`, returned as the x-coordinate of
/// the resulting point.
///
/// Bits are read least significant first within each byte. Every 200 bits form
/// a segment multiplied onto its own generator.
///
/// # Panics
/// If the preimage is empty or longer than `MAX_PREIMAGE_BYTES`.
pub fn hash(preimage: &[u8]) -> B256 {
    assert!(
        !preimage.is_empty() && preimage.len() <= MAX_PREIMAGE_BYTES,
        "preimage length {} outside 1..={}",
        preimage.len(),
        MAX_PREIMAGE_BYTES
    );
    let bits: Vec<bool> = preimage
        .iter()
        .flat_map(|byte| (0..8).map(move |i| (byte >> i) & 1 == 1))
        .collect();

    let point = bits
        .chunks(SEGMENT_BITS)
        .zip(GENERATORS.iter())
        .fold(Point::IDENTITY, |acc, (segment, generator)| {
            acc.add(&generator.mul(segment_scalar(segment)))
        });
    fr_to_b256(point.x)
}

/// Window `w` of bits `b0 b1 b2 s` contributes `±(1 + b0 + 2 b1 + 4 b2) * 32^w`,
/// negative when `s` is set. A negative total wraps modulo the subgroup order.
fn segment_scalar(segment: &[bool]) -> U256 {
    let mut positive = U256::ZERO;
    let mut negative = U256::ZERO;

    for (w, window) in segment.chunks(WINDOW_BITS).enumerate() {
        let magnitude = window
            .iter()
            .take(WINDOW_BITS - 1)
            .enumerate()
            .filter(|(_, bit)| **bit)
            .fold(1u64, |acc, (b, _)| acc + (1 << b));
        let term = U256::from(magnitude) << (w * (WINDOW_BITS + 1));

        if window.get(WINDOW_BITS - 1) == Some(&true) {
            negative += term;
        } else {
            positive += term;
        }
    }

    if positive >= negative {
        positive - negative
    } else {
        SUBGROUP_ORDER - (negative - positive)
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::b256;

    use super::*;

    #[test]
    fn test_generators_are_in_prime_subgroup() {
        for generator in &GENERATORS {
            assert!(generator.is_on_curve());
            assert_eq!(generator.mul(SUBGROUP_ORDER), Point::IDENTITY);
        }
    }

    #[test]
    fn test_single_byte_vector() {
        assert_eq!(
            hash(&[0x01]),
            b256!("01254f4a7d099ad4eb73240e64f9f16ee177a46d8a08e865ddde8924fac34f0d")
        );
    }

    #[test]
    fn test_window_scalar() {
        // b0 set: 1 + 1; second window empty: 1 * 32.
        assert_eq!(segment_scalar(&[true, false, false, false, false]), U256::from(34u64));
        // Sign bit set on the only window: -(1) wraps.
        assert_eq!(
            segment_scalar(&[false, false, false, true]),
            SUBGROUP_ORDER - U256::from(1u64)
        );
    }

    #[test]
    #[should_panic(expected = "preimage length")]
    fn test_rejects_oversized_preimage() {
        hash(&[0u8; MAX_PREIMAGE_BYTES + 1]);
    }
}
