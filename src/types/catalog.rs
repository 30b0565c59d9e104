//! Variable and product catalogs shared by all providers.
//!
//! A [`Variable`] is something a provider can be asked for and which lands in
//! exactly one point-database table. A [`Product`] is what callers load: either
//! a stored variable as-is, the magnitude of two component variables, or a
//! stored variable with a load-time [`Correction`].

use crate::types::sample::PointSeries;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Variable {
    /// Name used in provider requests and inside raw files.
    pub name: &'static str,
    /// Point-database table the decoded samples are written to.
    pub table: &'static str,
}

impl Variable {
    pub const fn new(name: &'static str, table: &'static str) -> Self {
        Self { name, table }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Adjustments applied after reading from the store, never written back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correction {
    /// Added to every timestamp, e.g. `-0.5` to move accumulations to bin centre.
    pub time_offset_hours: f64,
    /// Every value is divided by this, e.g. `3600.0` to turn an hourly energy total into a flux.
    pub divisor: f64,
}

impl Correction {
    pub const BIN_CENTRE: Correction = Correction {
        time_offset_hours: -0.5,
        divisor: 1.0,
    };

    pub const HOURLY_FLUX: Correction = Correction {
        time_offset_hours: -0.5,
        divisor: 3600.0,
    };

    pub fn apply(&self, mut series: PointSeries) -> PointSeries {
        if self.time_offset_hours != 0.0 {
            series
                .times
                .iter_mut()
                .for_each(|t| *t += self.time_offset_hours);
        }
        if self.divisor != 1.0 {
            series.values.iter_mut().for_each(|v| *v /= self.divisor);
        }
        series
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProductKind {
    /// Name of a provider variable, served straight from its table.
    Stored(&'static str),
    /// `sqrt(u^2 + v^2)` of two provider variables joined on (lat, lon, time).
    Magnitude(&'static str, &'static str),
    Corrected(&'static str, Correction),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Product {
    pub name: &'static str,
    pub kind: ProductKind,
}

impl Product {
    pub const fn stored(name: &'static str, variable: &'static str) -> Self {
        Self {
            name,
            kind: ProductKind::Stored(variable),
        }
    }

    pub const fn magnitude(name: &'static str, u: &'static str, v: &'static str) -> Self {
        Self {
            name,
            kind: ProductKind::Magnitude(u, v),
        }
    }

    pub const fn corrected(
        name: &'static str,
        variable: &'static str,
        correction: Correction,
    ) -> Self {
        Self {
            name,
            kind: ProductKind::Corrected(variable, correction),
        }
    }

    /// Provider variables this product reads.
    pub fn variables(&self) -> Vec<&'static str> {
        match self.kind {
            ProductKind::Stored(v) | ProductKind::Corrected(v, _) => vec![v],
            ProductKind::Magnitude(u, v) => vec![u, v],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bin_centre_and_flux_corrections() {
        let mut series = PointSeries::empty();
        series.push(7200.0, 46.5, -64.0, 100.0);

        let shifted = Correction::BIN_CENTRE.apply(series.clone());
        assert_eq!(shifted.times, vec![99.5]);
        assert_eq!(shifted.values, vec![7200.0]);

        let flux = Correction::HOURLY_FLUX.apply(series);
        assert_eq!(flux.times, vec![99.5]);
        assert_eq!(flux.values, vec![2.0]);
    }

    #[test]
    fn test_product_variables() {
        let uv = Product::magnitude("wind_uv", "u", "v");
        assert_eq!(uv.variables(), vec!["u", "v"]);
        let insolation = Product::corrected("insolation", "ssrd", Correction::BIN_CENTRE);
        assert_eq!(insolation.variables(), vec!["ssrd"]);
    }
}
