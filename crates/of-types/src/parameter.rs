//! Bounded optimisation parameters and their integer storage encoding.
//!
//! Every parameter maps its natural value onto a stable integer code. The
//! codes of all parameters of a study form the exact-match key used both by
//! the remote run store and by the local result cache.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::ParameterError;

/// Resolution used for float parameters when none is configured.
pub const DEFAULT_RESOLUTION: f64 = 1e-6;

/// Tolerance used when comparing float bounds and resolutions.
const FLOAT_EQ_TOLERANCE: f64 = 1e-12;

/// Fraction of the resolution a float value may stray outside its bounds.
const BOUNDS_SLACK: f64 = 0.99;

/// A concrete parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Int(i64),
    Float(f64),
}

impl ParameterValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Int(v) => *v as f64,
            Self::Float(v) => *v,
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for ParameterValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for ParameterValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

/// Wire description of a parameter, used to register and validate the
/// parameter schema of a study.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ParameterSchema {
    Int { minv: i64, maxv: i64 },
    Float { minv: f64, maxv: f64, resolution: f64 },
}

// ---------------------------------------------------------------------------
// Integer parameter
// ---------------------------------------------------------------------------

/// An integer parameter with inclusive bounds. Its storage code is the value
/// itself.
#[derive(Debug, Clone)]
pub struct IntParameter {
    value: i64,
    minv: i64,
    maxv: i64,
    constant: bool,
}

impl IntParameter {
    pub fn new(value: i64, minv: i64, maxv: i64) -> Result<Self, ParameterError> {
        if minv >= maxv {
            return Err(ParameterError::InvalidRange {
                minv: minv as f64,
                maxv: maxv as f64,
            });
        }
        let param = Self {
            value,
            minv,
            maxv,
            constant: false,
        };
        param.check_value(value)?;
        Ok(param)
    }

    /// Build from loosely typed values, rejecting anything that is not an
    /// integer.
    pub fn from_values(
        value: ParameterValue,
        minv: ParameterValue,
        maxv: ParameterValue,
    ) -> Result<Self, ParameterError> {
        Self::new(
            require_int("value", value)?,
            require_int("minv", minv)?,
            require_int("maxv", maxv)?,
        )
    }

    pub fn with_constant(mut self, constant: bool) -> Self {
        self.constant = constant;
        self
    }

    pub fn value(&self) -> i64 {
        self.value
    }

    pub fn set_value(&mut self, value: i64) -> Result<(), ParameterError> {
        self.check_value(value)?;
        self.value = value;
        Ok(())
    }

    pub fn minv(&self) -> i64 {
        self.minv
    }

    pub fn maxv(&self) -> i64 {
        self.maxv
    }

    pub fn constant(&self) -> bool {
        self.constant
    }

    fn check_value(&self, value: i64) -> Result<(), ParameterError> {
        if value < self.minv || value > self.maxv {
            return Err(ParameterError::OutOfBounds {
                value: value as f64,
                minv: self.minv as f64,
                maxv: self.maxv as f64,
            });
        }
        Ok(())
    }

    pub fn transform(&self, value: i64) -> Result<i64, ParameterError> {
        self.check_value(value)?;
        Ok(value)
    }

    pub fn inv_transform(&self, code: i64) -> Result<i64, ParameterError> {
        self.check_value(code)?;
        Ok(code)
    }
}

fn require_int(field: &str, value: ParameterValue) -> Result<i64, ParameterError> {
    match value {
        ParameterValue::Int(v) => Ok(v),
        ParameterValue::Float(v) => Err(ParameterError::TypeMismatch {
            field: field.to_string(),
            value: v.to_string(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Float parameter
// ---------------------------------------------------------------------------

/// A float parameter with inclusive bounds, discretised on a grid of
/// `resolution` starting at `minv`.
#[derive(Debug, Clone)]
pub struct FloatParameter {
    value: f64,
    minv: f64,
    maxv: f64,
    resolution: f64,
    constant: bool,
}

impl FloatParameter {
    pub fn new(value: f64, minv: f64, maxv: f64, resolution: f64) -> Result<Self, ParameterError> {
        if !(minv < maxv) {
            return Err(ParameterError::InvalidRange { minv, maxv });
        }
        // the largest code must fit the native integer
        let max_code = ((maxv - minv) / resolution).round();
        if !(resolution > 0.0) || !max_code.is_finite() || max_code > (i64::MAX - 1) as f64 {
            return Err(ParameterError::ResolutionTooFine {
                resolution,
                minv,
                maxv,
            });
        }
        let param = Self {
            value,
            minv,
            maxv,
            resolution,
            constant: false,
        };
        param.check_value(value)?;
        Ok(param)
    }

    pub fn with_constant(mut self, constant: bool) -> Self {
        self.constant = constant;
        self
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn set_value(&mut self, value: f64) -> Result<(), ParameterError> {
        self.check_value(value)?;
        self.value = value;
        Ok(())
    }

    pub fn minv(&self) -> f64 {
        self.minv
    }

    pub fn maxv(&self) -> f64 {
        self.maxv
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    pub fn constant(&self) -> bool {
        self.constant
    }

    fn check_value(&self, value: f64) -> Result<(), ParameterError> {
        let slack = BOUNDS_SLACK * self.resolution;
        if value.is_nan() || value < self.minv - slack || value > self.maxv + slack {
            return Err(ParameterError::OutOfBounds {
                value,
                minv: self.minv,
                maxv: self.maxv,
            });
        }
        Ok(())
    }

    /// Largest code whose decoded value is still within bounds.
    pub fn max_code(&self) -> i64 {
        ((self.maxv - self.minv) / self.resolution + BOUNDS_SLACK).floor() as i64
    }

    /// Ties round away from zero. Values inside the slack below `minv` or
    /// above `maxv` are pulled onto the outermost grid points.
    pub fn transform(&self, value: f64) -> Result<i64, ParameterError> {
        self.check_value(value)?;
        let code = ((value - self.minv) / self.resolution).round();
        Ok(code.clamp(0.0, self.max_code() as f64) as i64)
    }

    /// Bounds are checked on the decoded value.
    pub fn inv_transform(&self, code: i64) -> Result<f64, ParameterError> {
        let value = self.minv + code as f64 * self.resolution;
        self.check_value(value)?;
        Ok(value)
    }
}

// ---------------------------------------------------------------------------
// Parameter
// ---------------------------------------------------------------------------

/// A bounded scalar optimisation parameter.
#[derive(Debug, Clone)]
pub enum Parameter {
    Int(IntParameter),
    Float(FloatParameter),
}

impl Parameter {
    /// Integer parameter shorthand.
    pub fn int(value: i64, minv: i64, maxv: i64) -> Result<Self, ParameterError> {
        Ok(Self::Int(IntParameter::new(value, minv, maxv)?))
    }

    /// Float parameter shorthand.
    pub fn float(value: f64, minv: f64, maxv: f64, resolution: f64) -> Result<Self, ParameterError> {
        Ok(Self::Float(FloatParameter::new(value, minv, maxv, resolution)?))
    }

    pub fn with_constant(self, constant: bool) -> Self {
        match self {
            Self::Int(p) => Self::Int(p.with_constant(constant)),
            Self::Float(p) => Self::Float(p.with_constant(constant)),
        }
    }

    pub fn value(&self) -> ParameterValue {
        match self {
            Self::Int(p) => ParameterValue::Int(p.value()),
            Self::Float(p) => ParameterValue::Float(p.value()),
        }
    }

    pub fn set_value(&mut self, value: ParameterValue) -> Result<(), ParameterError> {
        match self {
            Self::Int(p) => {
                let v = round_to_int(p, value)?;
                p.set_value(v)
            }
            Self::Float(p) => p.set_value(value.as_f64()),
        }
    }

    pub fn minv(&self) -> ParameterValue {
        match self {
            Self::Int(p) => ParameterValue::Int(p.minv()),
            Self::Float(p) => ParameterValue::Float(p.minv()),
        }
    }

    pub fn maxv(&self) -> ParameterValue {
        match self {
            Self::Int(p) => ParameterValue::Int(p.maxv()),
            Self::Float(p) => ParameterValue::Float(p.maxv()),
        }
    }

    pub fn constant(&self) -> bool {
        match self {
            Self::Int(p) => p.constant(),
            Self::Float(p) => p.constant(),
        }
    }

    /// Map a natural value to its storage code.
    ///
    /// Integer parameters accept float input and snap it to the nearest
    /// integer before the bounds check.
    pub fn transform(&self, value: ParameterValue) -> Result<i64, ParameterError> {
        match self {
            Self::Int(p) => p.transform(round_to_int(p, value)?),
            Self::Float(p) => p.transform(value.as_f64()),
        }
    }

    /// Map a storage code back to its natural value.
    pub fn inv_transform(&self, code: i64) -> Result<ParameterValue, ParameterError> {
        match self {
            Self::Int(p) => p.inv_transform(code).map(ParameterValue::Int),
            Self::Float(p) => p.inv_transform(code).map(ParameterValue::Float),
        }
    }

    /// Check bounds and snap the value onto the parameter's grid.
    pub fn snap(&self, value: ParameterValue) -> Result<ParameterValue, ParameterError> {
        self.inv_transform(self.transform(value)?)
    }

    pub fn schema(&self) -> ParameterSchema {
        match self {
            Self::Int(p) => ParameterSchema::Int {
                minv: p.minv(),
                maxv: p.maxv(),
            },
            Self::Float(p) => ParameterSchema::Float {
                minv: p.minv(),
                maxv: p.maxv(),
                resolution: p.resolution(),
            },
        }
    }
}

/// Nearest integer to a float input. Bounds are left to the caller, so
/// 10.4 on `[0, 10]` snaps to 10 while 10.6 is out of bounds.
fn round_to_int(p: &IntParameter, value: ParameterValue) -> Result<i64, ParameterError> {
    match value {
        ParameterValue::Int(v) => Ok(v),
        ParameterValue::Float(v) if !v.is_finite() => Err(ParameterError::OutOfBounds {
            value: v,
            minv: p.minv() as f64,
            maxv: p.maxv() as f64,
        }),
        ParameterValue::Float(v) => Ok(v.round() as i64),
    }
}

/// Structural equality: variant, bounds and resolution. The current value
/// and the constant flag are ignored.
impl PartialEq for Parameter {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a.minv() == b.minv() && a.maxv() == b.maxv(),
            (Self::Float(a), Self::Float(b)) => {
                (a.resolution() - b.resolution()).abs() <= FLOAT_EQ_TOLERANCE
                    && (a.minv() - b.minv()).abs() <= FLOAT_EQ_TOLERANCE
                    && (a.maxv() - b.maxv()).abs() <= FLOAT_EQ_TOLERANCE
            }
            _ => false,
        }
    }
}

impl From<IntParameter> for Parameter {
    fn from(p: IntParameter) -> Self {
        Self::Int(p)
    }
}

impl From<FloatParameter> for Parameter {
    fn from(p: FloatParameter) -> Self {
        Self::Float(p)
    }
}

/// Loosely typed parameter description as read from a configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    #[serde(rename = "type")]
    pub kind: ParameterKind,
    pub value: ParameterValue,
    pub minv: ParameterValue,
    pub maxv: ParameterValue,
    #[serde(default)]
    pub resolution: Option<f64>,
    #[serde(default)]
    pub constant: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    Int,
    Float,
}

impl ParameterSpec {
    pub fn build(&self) -> Result<Parameter, ParameterError> {
        let param = match self.kind {
            ParameterKind::Int => {
                if let Some(resolution) = self.resolution {
                    return Err(ParameterError::TypeMismatch {
                        field: "resolution".to_string(),
                        value: resolution.to_string(),
                    });
                }
                Parameter::Int(IntParameter::from_values(self.value, self.minv, self.maxv)?)
            }
            ParameterKind::Float => Parameter::float(
                self.value.as_f64(),
                self.minv.as_f64(),
                self.maxv.as_f64(),
                self.resolution.unwrap_or(DEFAULT_RESOLUTION),
            )?,
        };
        Ok(param.with_constant(self.constant))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> Parameter {
        Parameter::float(0.0, -10.0, 20.0, 1.0).unwrap()
    }

    #[test]
    fn float_bad_range() {
        assert!(matches!(
            Parameter::float(1.5, 2.0, 1.0, DEFAULT_RESOLUTION),
            Err(ParameterError::InvalidRange { .. })
        ));
        assert!(matches!(
            Parameter::float(1.0, 1.0, 1.0, DEFAULT_RESOLUTION),
            Err(ParameterError::InvalidRange { .. })
        ));
    }

    #[test]
    fn float_value_outside_range() {
        assert!(matches!(
            Parameter::float(5.0, 1.0, 3.0, DEFAULT_RESOLUTION),
            Err(ParameterError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn float_resolution_too_fine() {
        assert!(matches!(
            Parameter::float(0.0, -1e12, 1e12, 1e-10),
            Err(ParameterError::ResolutionTooFine { .. })
        ));
        assert!(matches!(
            Parameter::float(0.0, -1.0, 1.0, 0.0),
            Err(ParameterError::ResolutionTooFine { .. })
        ));
    }

    #[test]
    fn float_attributes_and_schema() {
        let p = grid();
        assert_eq!(p.value(), ParameterValue::Float(0.0));
        assert_eq!(p.minv(), ParameterValue::Float(-10.0));
        assert_eq!(p.maxv(), ParameterValue::Float(20.0));
        assert!(!p.constant());
        assert_eq!(
            serde_json::to_value(p.schema()).unwrap(),
            serde_json::json!({"type": "float", "minv": -10.0, "maxv": 20.0, "resolution": 1.0})
        );
    }

    #[test]
    fn float_value_assignment() {
        let mut p = grid();
        p.set_value(ParameterValue::Float(5.0)).unwrap();
        assert_eq!(p.value(), ParameterValue::Float(5.0));
        for v in [-11.0, 21.0] {
            assert!(p.set_value(ParameterValue::Float(v)).is_err());
        }
        // rejected assignments leave the value untouched
        assert_eq!(p.value(), ParameterValue::Float(5.0));
    }

    #[test]
    fn float_transform_rejects_out_of_bounds() {
        let p = grid();
        assert!(p.transform(ParameterValue::Float(-15.0)).is_err());
        assert!(p.transform(ParameterValue::Float(21.0)).is_err());
        assert!(p.inv_transform(-1).is_err());
        assert!(p.inv_transform(31).is_err());
    }

    #[test]
    fn float_transform_table() {
        let p = grid();
        let cases = [
            (-10.0, 0, -10.0),
            (-9.6, 0, -10.0),
            (0.0, 10, 0.0),
            (-0.5, 10, 0.0),
            (19.0, 29, 19.0),
            (20.0, 30, 20.0),
        ];
        for (value, code, snapped) in cases {
            assert_eq!(p.transform(ParameterValue::Float(value)).unwrap(), code, "{value}");
            let back = p.inv_transform(code).unwrap().as_f64();
            assert!((back - snapped).abs() < 1e-10, "{value} -> {back}");
        }
    }

    #[test]
    fn float_transform_fine_resolution() {
        let p = Parameter::float(0.0, -1.0, 2.5, 1e-5).unwrap();
        let cases = [(-1.0, 0), (2.5, 350000), (0.75, 175000), (1.0, 200000)];
        for (value, code) in cases {
            assert_eq!(p.transform(ParameterValue::Float(value)).unwrap(), code);
            assert!((p.inv_transform(code).unwrap().as_f64() - value).abs() < 1e-10);
        }
    }

    #[test]
    fn float_slack_snaps_to_outer_grid_points() {
        let p = grid();
        assert_eq!(p.transform(ParameterValue::Float(-10.5)).unwrap(), 0);
        assert_eq!(p.snap(ParameterValue::Float(-10.98)).unwrap(), ParameterValue::Float(-10.0));
        assert_eq!(p.transform(ParameterValue::Float(20.9)).unwrap(), 30);
        assert_eq!(p.snap(ParameterValue::Float(20.5)).unwrap(), ParameterValue::Float(20.0));
        assert!(p.transform(ParameterValue::Float(-11.0)).is_err());
        assert!(p.transform(ParameterValue::Float(21.0)).is_err());

        // off-grid upper bound
        let p = FloatParameter::new(0.0, 0.0, 1.0, 0.3).unwrap();
        assert_eq!(p.max_code(), 4);
        assert_eq!(p.transform(1.29).unwrap(), 4);
        assert!(p.inv_transform(p.max_code()).is_ok());
    }

    #[test]
    fn int_rejects_codes_out_of_range() {
        let p = Parameter::int(1, -5, 12).unwrap();
        assert!(p.transform(ParameterValue::Int(13)).is_err());
        assert!(p.inv_transform(-6).is_err());
    }

    #[test]
    fn int_snaps_float_input() {
        let p = Parameter::int(0, 0, 10).unwrap();
        assert_eq!(p.transform(ParameterValue::Float(3.6)).unwrap(), 4);
        assert_eq!(p.snap(ParameterValue::Float(2.2)).unwrap(), ParameterValue::Int(2));
        // rounded first, then bounds checked
        assert_eq!(p.transform(ParameterValue::Float(10.4)).unwrap(), 10);
        assert_eq!(p.snap(ParameterValue::Float(-0.4)).unwrap(), ParameterValue::Int(0));
        assert!(p.transform(ParameterValue::Float(10.6)).is_err());
        assert!(p.transform(ParameterValue::Float(-0.5)).is_err());
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(matches!(
                p.transform(ParameterValue::Float(bad)),
                Err(ParameterError::OutOfBounds { .. })
            ));
        }

        let mut q = p.clone();
        q.set_value(ParameterValue::Float(9.7)).unwrap();
        assert_eq!(q.value(), ParameterValue::Int(10));
        assert!(q.set_value(ParameterValue::Float(f64::NAN)).is_err());
    }

    #[test]
    fn int_bad_construction() {
        assert!(matches!(
            Parameter::int(1, 3, 2),
            Err(ParameterError::InvalidRange { .. })
        ));
        assert!(matches!(
            Parameter::int(5, 0, 3),
            Err(ParameterError::OutOfBounds { .. })
        ));
        assert!(matches!(
            IntParameter::from_values(
                ParameterValue::Float(1.5),
                ParameterValue::Int(0),
                ParameterValue::Int(3)
            ),
            Err(ParameterError::TypeMismatch { .. })
        ));
        assert!(matches!(
            IntParameter::from_values(
                ParameterValue::Int(1),
                ParameterValue::Int(0),
                ParameterValue::Float(3.0)
            ),
            Err(ParameterError::TypeMismatch { ref field, .. }) if field == "maxv"
        ));
    }

    #[test]
    fn int_schema() {
        let p = Parameter::int(1, 0, 2).unwrap();
        assert_eq!(
            serde_json::to_value(p.schema()).unwrap(),
            serde_json::json!({"type": "int", "minv": 0, "maxv": 2})
        );
    }

    #[test]
    fn structural_equality() {
        let params = [
            ("af", Parameter::float(1.0, 0.0, 2.0, 1e-7).unwrap()),
            ("bf", Parameter::float(1.5, 1.0, 2.0, 1e-7).unwrap()),
            ("cf", Parameter::float(1.5, 0.0, 3.0, 1e-7).unwrap()),
            ("df", Parameter::float(1.0, 0.0, 2.0, 1e-6).unwrap()),
            ("ai", Parameter::int(1, 0, 2).unwrap()),
            ("bi", Parameter::int(1, 1, 2).unwrap()),
            ("ci", Parameter::int(2, 0, 3).unwrap()),
        ];
        let af = &params[0].1;
        for (name, p) in &params {
            assert_eq!(af == p, *name == "af", "{name}");
        }
        // value and constant flag do not take part
        let other = Parameter::float(0.5, 0.0, 2.0, 1e-7).unwrap().with_constant(true);
        assert_eq!(af, &other);
    }

    #[test]
    fn parameter_spec_builds() {
        let spec: ParameterSpec = serde_json::from_value(serde_json::json!({
            "type": "float", "value": 0, "minv": -1, "maxv": 1, "constant": true
        }))
        .unwrap();
        let p = spec.build().unwrap();
        assert!(p.constant());
        assert_eq!(p, Parameter::float(0.0, -1.0, 1.0, DEFAULT_RESOLUTION).unwrap());

        let spec: ParameterSpec = serde_json::from_value(serde_json::json!({
            "type": "int", "value": 1.5, "minv": 0, "maxv": 3
        }))
        .unwrap();
        assert!(matches!(spec.build(), Err(ParameterError::TypeMismatch { .. })));
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_float_round_trip_within_resolution(
            minv in -1e3f64..1e3,
            span in 1e-2f64..1e3,
            fraction in 1e-6f64..0.5,
            position in 0.0f64..=1.0
        ) {
            let resolution = span * fraction;
            let p = Parameter::float(minv, minv, minv + span, resolution).unwrap();
            let value = minv + position * span;
            let code = p.transform(ParameterValue::Float(value)).unwrap();
            let back = p.inv_transform(code).unwrap().as_f64();
            prop_assert!((back - value).abs() <= resolution, "{value} -> {back}");
            prop_assert_eq!(p.transform(ParameterValue::Float(back)).unwrap(), code);
        }

        #[test]
        fn prop_float_slack_always_snaps(
            minv in -1e3f64..1e3,
            span in 1e-2f64..1e3,
            fraction in 1e-6f64..0.5,
            below in 0.0f64..0.98,
            above in 0.0f64..0.98
        ) {
            let resolution = span * fraction;
            let maxv = minv + span;
            let p = Parameter::float(minv, minv, maxv, resolution).unwrap();
            let low = p.snap(ParameterValue::Float(minv - below * resolution)).unwrap().as_f64();
            prop_assert!((low - minv).abs() <= 1e-9 * span.max(1.0));
            let high = p.snap(ParameterValue::Float(maxv + above * resolution)).unwrap().as_f64();
            prop_assert!(high <= maxv + BOUNDS_SLACK * resolution);
        }

        #[test]
        fn prop_int_round_trip_is_exact(
            minv in -1000i64..1000,
            span in 1i64..1000,
            offset in 0i64..1000
        ) {
            let maxv = minv + span;
            let value = minv + offset % (span + 1);
            let p = Parameter::int(minv, minv, maxv).unwrap();
            let code = p.transform(ParameterValue::Int(value)).unwrap();
            prop_assert_eq!(code, value);
            prop_assert_eq!(p.inv_transform(code).unwrap(), ParameterValue::Int(value));
            prop_assert!(p.transform(ParameterValue::Int(maxv + 1)).is_err());
        }

        #[test]
        fn prop_int_float_input_rounds_then_checks(
            minv in -1000i64..1000,
            span in 1i64..1000,
            x in -0.49f64..1.49
        ) {
            let maxv = minv + span;
            let p = Parameter::int(minv, minv, maxv).unwrap();
            let value = minv as f64 + x * span as f64;
            let rounded = value.round() as i64;
            match p.transform(ParameterValue::Float(value)) {
                Ok(code) => {
                    prop_assert_eq!(code, rounded);
                }
                Err(_) => {
                    prop_assert!(rounded < minv || rounded > maxv);
                }
            }
        }
    }
}
