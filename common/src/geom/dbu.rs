/// Database unit. All geometry is stored as integers of this type.
pub type DbU = i64;

pub const UNITS_PER_LAMBDA: DbU = 100;

#[inline]
pub fn from_lambda(lambda: f64) -> DbU {
    (lambda * UNITS_PER_LAMBDA as f64).round() as DbU
}

#[inline]
pub fn to_lambda(units: DbU) -> f64 {
    units as f64 / UNITS_PER_LAMBDA as f64
}
