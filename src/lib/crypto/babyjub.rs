//! Baby Jubjub, the twisted Edwards curve `a x^2 + y^2 = 1 + d x^2 y^2`
//! over the BN254 scalar field.

use alloy::primitives::{
    uint,
    U256,
};
use ark_bn254::Fr;
use ark_ff::{
    Field,
    MontFp,
};

pub const A: Fr = MontFp!("168700");
pub const D: Fr = MontFp!("168696");

/// Order of the prime-order subgroup the Pedersen generators live in.
pub const SUBGROUP_ORDER: U256 =
    uint!(2736030358979909402780800718157159386076813972158567259200215660948447373041_U256);

/// Affine point on Baby Jubjub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    pub x: Fr,
    pub y: Fr,
}

impl Point {
    pub const IDENTITY: Point = Point {
        x: MontFp!("0"),
        y: MontFp!("1"),
    };

    pub fn add(&self, other: &Point) -> Point {
        let one: Fr = MontFp!("1");
        let beta = self.x * other.y;
        let gamma = self.y * other.x;
        let delta = (self.y - A * self.x) * (other.x + other.y);
        let dtau = D * beta * gamma;

        Point {
            x: (beta + gamma) * invert(one + dtau),
            y: (delta + A * beta - gamma) * invert(one - dtau),
        }
    }

    /// Double-and-add, most significant bit first, in projective coordinates.
    pub fn mul(&self, scalar: U256) -> Point {
        let base = Projective::from(*self);
        let mut acc = Projective::from(Self::IDENTITY);
        for i in (0..scalar.bit_len()).rev() {
            acc = acc.add(&acc);
            if scalar.bit(i) {
                acc = acc.add(&base);
            }
        }
        acc.to_affine()
    }

    pub fn is_on_curve(&self) -> bool {
        let one: Fr = MontFp!("1");
        let x2 = self.x.square();
        let y2 = self.y.square();
        A * x2 + y2 == one + D * x2 * y2
    }
}

/// `(X : Y : Z)` with `x = X/Z`, `y = Y/Z`.
#[derive(Debug, Clone, Copy)]
struct Projective {
    x: Fr,
    y: Fr,
    z: Fr,
}

impl Projective {
    /// add-2008-bbjlp; also used for doubling.
    fn add(&self, other: &Projective) -> Projective {
        let a = self.z * other.z;
        let b = a.square();
        let c = self.x * other.x;
        let d = self.y * other.y;
        let e = D * c * d;
        let f = b - e;
        let g = b + e;

        Projective {
            x: a * f * ((self.x + self.y) * (other.x + other.y) - c - d),
            y: a * g * (d - A * c),
            z: f * g,
        }
    }

    fn to_affine(self) -> Point {
        let z_inv = invert(self.z);
        Point {
            x: self.x * z_inv,
            y: self.y * z_inv,
        }
    }
}

impl From<Point> for Projective {
    fn from(point: Point) -> Self {
        Projective {
            x: point.x,
            y: point.y,
            z: MontFp!("1"),
        }
    }
}

// `a` is a square and `d` is not, so the addition law is complete and its
// denominators (affine `1 ± d·x1·x2·y1·y2`, projective `Z`) never vanish.
fn invert(value: Fr) -> Fr {
    value
        .inverse()
        .expect("complete addition has non-zero denominators")
}
