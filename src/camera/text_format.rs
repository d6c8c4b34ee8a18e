//! Single-line text serialization for [`PlumbBobModel`].
//!
//! The record looks like
//!
//! ```text
//! CameraIntrinsicsPlumbBob {320, 240, 30, 15, 100, 125, 0.001, 0.02, 0.0001, 0.000007, -0.01, 0.005}
//! ```
//!
//! with fields `width, height, fx, fy, cx, cy, skew, k0, k1, k2, t0, t1`.
//! Floats are written in Rust's shortest round-trip form, so reading back what
//! was written reproduces the model exactly.

use crate::camera::{CameraModelError, Intrinsics, PlumbBobModel, Resolution};
use std::fmt;
use std::io::{self, BufRead, Write};
use std::str::FromStr;

/// Leading tag of a text record.
pub const TYPE_TAG: &str = "CameraIntrinsicsPlumbBob";

const FIELD_COUNT: usize = 12;

fn malformed(message: impl Into<String>) -> CameraModelError {
    CameraModelError::MalformedStream(message.into())
}

fn parse_field<T: FromStr>(field: &str, name: &str) -> Result<T, CameraModelError> {
    field
        .parse::<T>()
        .map_err(|_| malformed(format!("cannot parse {} from {:?}", name, field)))
}

impl fmt::Display for PlumbBobModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [k0, k1, k2] = self.radial();
        let [t0, t1] = self.tangential();
        write!(
            f,
            "{} {{{}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}}}",
            TYPE_TAG,
            self.resolution.width,
            self.resolution.height,
            self.intrinsics.fx,
            self.intrinsics.fy,
            self.intrinsics.cx,
            self.intrinsics.cy,
            self.skew(),
            k0,
            k1,
            k2,
            t0,
            t1,
        )
    }
}

impl FromStr for PlumbBobModel {
    type Err = CameraModelError;

    /// Parses a text record. The resulting model has both gates enabled.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s
            .trim()
            .strip_prefix(TYPE_TAG)
            .ok_or_else(|| malformed(format!("expected record to start with {}", TYPE_TAG)))?;
        let body = body
            .trim_start()
            .strip_prefix('{')
            .and_then(|rest| rest.strip_suffix('}'))
            .ok_or_else(|| malformed("expected field list enclosed in braces"))?;

        let fields: Vec<&str> = body.split(',').map(str::trim).collect();
        if fields.len() != FIELD_COUNT {
            return Err(malformed(format!(
                "expected {} fields, found {}",
                FIELD_COUNT,
                fields.len()
            )));
        }

        let resolution = Resolution {
            width: parse_field(fields[0], "width")?,
            height: parse_field(fields[1], "height")?,
        };

        let names = ["fx", "fy", "cx", "cy", "skew", "k0", "k1", "k2", "t0", "t1"];
        let mut values = [0.0; 10];
        for (value, (field, name)) in values.iter_mut().zip(fields[2..].iter().zip(names)) {
            *value = parse_field(field, name)?;
        }
        let [fx, fy, cx, cy, skew, k0, k1, k2, t0, t1] = values;

        PlumbBobModel::new(
            resolution,
            Intrinsics { fx, fy, cx, cy },
            skew,
            [k0, k1, k2],
            [t0, t1],
        )
        .map_err(|e| malformed(e.to_string()))
    }
}

impl PlumbBobModel {
    /// Replaces this model with the one described by `s`.
    ///
    /// On error the model is left untouched. On success both gates are
    /// enabled again, as for a freshly constructed model.
    pub fn read_from_str(&mut self, s: &str) -> Result<(), CameraModelError> {
        *self = s.parse()?;
        Ok(())
    }

    /// Reads one record line from `reader`, with the same guarantees as
    /// [`PlumbBobModel::read_from_str`].
    pub fn read_from<R: BufRead>(&mut self, reader: &mut R) -> Result<(), CameraModelError> {
        let mut line = String::new();
        let read = reader.read_line(&mut line).map_err(|e| match e.kind() {
            io::ErrorKind::InvalidData => malformed(e.to_string()),
            _ => CameraModelError::from(e),
        })?;
        if read == 0 {
            return Err(malformed("unexpected end of stream"));
        }
        self.read_from_str(&line)
    }

    /// Writes the record followed by a newline.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), CameraModelError> {
        writeln!(writer, "{}", self)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraModel;
    use std::io::Cursor;

    fn reference_model() -> PlumbBobModel {
        PlumbBobModel::new(
            Resolution {
                width: 320,
                height: 240,
            },
            Intrinsics {
                fx: 30.0,
                fy: 15.0,
                cx: 100.0,
                cy: 125.0,
            },
            0.001,
            [0.02, 1e-4, 7e-6],
            [-0.01, 0.005],
        )
        .unwrap()
    }

    #[test]
    fn test_display_layout() {
        assert_eq!(
            reference_model().to_string(),
            "CameraIntrinsicsPlumbBob {320, 240, 30, 15, 100, 125, 0.001, 0.02, 0.0001, 0.000007, -0.01, 0.005}"
        );
    }

    #[test]
    fn test_write_then_read_is_exact() {
        let mut model = reference_model();
        model.intrinsics.fx = 1.0 / 3.0;
        model.intrinsics.cy = 125.000000000001;

        let parsed: PlumbBobModel = model.to_string().parse().unwrap();
        assert_eq!(parsed, model);
    }

    #[test]
    fn test_stream_round_trip() {
        let model = reference_model();
        let mut buffer = Vec::new();
        model.write_to(&mut buffer).unwrap();
        model.write_to(&mut buffer).unwrap();

        let mut reader = Cursor::new(buffer);
        let mut first = PlumbBobModel::default();
        let mut second = PlumbBobModel::default();
        first.read_from(&mut reader).unwrap();
        second.read_from(&mut reader).unwrap();
        assert_eq!(first, model);
        assert_eq!(second, model);

        let mut third = PlumbBobModel::default();
        assert!(matches!(
            third.read_from(&mut reader),
            Err(CameraModelError::MalformedStream(_))
        ));
        assert_eq!(third, PlumbBobModel::default());
    }

    #[test]
    fn test_malformed_input_leaves_model_unchanged() {
        let inputs = [
            "",
            "CameraIntrinsicsPinhole {320, 240, 30, 15, 100, 125, 0, 0, 0, 0, 0, 0}",
            "CameraIntrinsicsPlumbBob 320, 240, 30, 15, 100, 125, 0, 0, 0, 0, 0, 0",
            "CameraIntrinsicsPlumbBob {320, 240, 30, 15, 100, 125, 0, 0, 0, 0, 0}",
            "CameraIntrinsicsPlumbBob {320, 240, 30, 15, 100, 125, 0, 0, 0, 0, 0, 0, 0}",
            "CameraIntrinsicsPlumbBob {320.5, 240, 30, 15, 100, 125, 0, 0, 0, 0, 0, 0}",
            "CameraIntrinsicsPlumbBob {-1, 240, 30, 15, 100, 125, 0, 0, 0, 0, 0, 0}",
            "CameraIntrinsicsPlumbBob {320, 240, thirty, 15, 100, 125, 0, 0, 0, 0, 0, 0}",
            "CameraIntrinsicsPlumbBob {320, 240, 0, 15, 100, 125, 0, 0, 0, 0, 0, 0}",
        ];

        for input in inputs {
            let mut model = reference_model();
            model.allow_skew(false);
            let before = model.clone();

            let result = model.read_from_str(input);
            assert!(
                matches!(result, Err(CameraModelError::MalformedStream(_))),
                "{:?} should be rejected",
                input
            );
            assert_eq!(model, before);
        }
    }

    #[test]
    fn test_invalid_utf8_line_is_malformed() {
        let mut reader = Cursor::new(vec![0xff, 0xfe, b'\n']);
        let mut model = reference_model();
        assert!(matches!(
            model.read_from(&mut reader),
            Err(CameraModelError::MalformedStream(_))
        ));
        assert_eq!(model, reference_model());
    }

    #[test]
    fn test_successful_read_enables_gates() {
        let mut model = reference_model();
        model.allow_sixth_order_radial(false);
        model.allow_skew(false);
        assert_eq!(model.num_free_parameters(), 4);

        model.read_from_str(&reference_model().to_string()).unwrap();
        assert!(model.allows_sixth_order_radial());
        assert!(model.allows_skew());
        assert_eq!(model.num_free_parameters(), 6);
        assert_eq!(model.skew(), 0.001);
    }

    #[test]
    fn test_tolerates_surrounding_whitespace() {
        let text = "  CameraIntrinsicsPlumbBob{ 320,240 , 30,15,100,125,0.001,0.02,0.0001,0.000007,-0.01,0.005 }\n";
        let parsed: PlumbBobModel = text.parse().unwrap();
        assert_eq!(parsed, reference_model());
    }
}
