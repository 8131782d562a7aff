//! Per-element-type behavior for raster samples.
//!
//! Each numeric element type a tile can carry implements [`Sample`]: the
//! "no data" sentinel, averaging, f64 conversion and little-endian I/O.
//! Resolution happens at compile time through generics; there is no runtime
//! type registry.

/// Behavior bound to a raster element type.
///
/// Floats use NaN as the sentinel, integers use their type maximum. The
/// `NATIVE_TAG` is the element-type byte of the native binary tile format;
/// `None` marks types the native codec cannot encode.
pub trait Sample: Copy + PartialEq + Send + Sync + 'static {
    /// Sentinel value meaning "no measurement available".
    const NO_VALUE: Self;
    /// Encoded size of one element in bytes.
    const BYTES: usize;
    /// Element-type tag in the native binary format header, if encodable.
    const NATIVE_TAG: Option<u8>;

    /// True when the value is the sentinel.
    fn is_no_value(self) -> bool;

    /// Converts to f64, mapping the sentinel to NaN.
    fn to_f64(self) -> f64;

    /// Converts from f64, mapping NaN to the sentinel. Integer types
    /// truncate toward zero.
    fn from_f64(value: f64) -> Self;

    /// Arithmetic mean of the non-sentinel values, or the sentinel when
    /// there are none. Integer types accumulate in a wider type.
    fn average<I: IntoIterator<Item = Self>>(values: I) -> Self;

    /// Reads one element from a little-endian byte slice.
    fn read_le(bytes: &[u8]) -> Self;

    /// Appends the little-endian encoding of one element.
    fn write_le(self, out: &mut Vec<u8>);
}

macro_rules! float_sample {
    ($ty:ty, $bytes:expr, $tag:expr) => {
        impl Sample for $ty {
            const NO_VALUE: Self = <$ty>::NAN;
            const BYTES: usize = $bytes;
            const NATIVE_TAG: Option<u8> = $tag;

            fn is_no_value(self) -> bool {
                self.is_nan()
            }

            fn to_f64(self) -> f64 {
                self as f64
            }

            fn from_f64(value: f64) -> Self {
                value as $ty
            }

            fn average<I: IntoIterator<Item = Self>>(values: I) -> Self {
                let mut sum = 0.0f64;
                let mut count = 0usize;
                for v in values {
                    if !v.is_no_value() {
                        sum += v as f64;
                        count += 1;
                    }
                }
                if count == 0 {
                    Self::NO_VALUE
                } else {
                    (sum / count as f64) as $ty
                }
            }

            fn read_le(bytes: &[u8]) -> Self {
                <$ty>::from_le_bytes(bytes[..$bytes].try_into().unwrap())
            }

            fn write_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }
        }
    };
}

macro_rules! int_sample {
    ($ty:ty, $bytes:expr, $tag:expr) => {
        impl Sample for $ty {
            const NO_VALUE: Self = <$ty>::MAX;
            const BYTES: usize = $bytes;
            const NATIVE_TAG: Option<u8> = $tag;

            fn is_no_value(self) -> bool {
                self == Self::NO_VALUE
            }

            fn to_f64(self) -> f64 {
                if self.is_no_value() {
                    f64::NAN
                } else {
                    self as f64
                }
            }

            fn from_f64(value: f64) -> Self {
                if value.is_nan() {
                    Self::NO_VALUE
                } else {
                    value as $ty
                }
            }

            fn average<I: IntoIterator<Item = Self>>(values: I) -> Self {
                let mut sum = 0i64;
                let mut count = 0i64;
                for v in values {
                    if !v.is_no_value() {
                        sum += v as i64;
                        count += 1;
                    }
                }
                if count == 0 {
                    Self::NO_VALUE
                } else {
                    (sum / count) as $ty
                }
            }

            fn read_le(bytes: &[u8]) -> Self {
                <$ty>::from_le_bytes(bytes[..$bytes].try_into().unwrap())
            }

            fn write_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }
        }
    };
}

float_sample!(f32, 4, Some(0));
float_sample!(f64, 8, Some(3));
int_sample!(i16, 2, Some(1));
int_sample!(u16, 2, Some(2));
int_sample!(i32, 4, None);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_sentinel_is_nan() {
        assert!(f32::NO_VALUE.is_no_value());
        assert!(f64::NO_VALUE.is_no_value());
        assert!(!0.0f32.is_no_value());
    }

    #[test]
    fn test_integer_sentinel_is_type_max() {
        assert!(i16::MAX.is_no_value());
        assert!(u16::MAX.is_no_value());
        assert!(i32::MAX.is_no_value());
        assert!(!0i16.is_no_value());
        assert!(!(-32768i16).is_no_value());
    }

    #[test]
    fn test_to_f64_maps_sentinel_to_nan() {
        assert!(i16::NO_VALUE.to_f64().is_nan());
        assert!(u16::NO_VALUE.to_f64().is_nan());
        assert_eq!(1234i16.to_f64(), 1234.0);
    }

    #[test]
    fn test_from_f64_maps_nan_to_sentinel() {
        assert_eq!(i16::from_f64(f64::NAN), i16::NO_VALUE);
        assert_eq!(u16::from_f64(f64::NAN), u16::NO_VALUE);
        assert!(f32::from_f64(f64::NAN).is_nan());
    }

    #[test]
    fn test_from_f64_truncates_integers() {
        assert_eq!(i16::from_f64(12.9), 12);
        assert_eq!(i16::from_f64(-3.7), -3);
    }

    #[test]
    fn test_average_skips_sentinels() {
        let avg = i16::average([10, 20, i16::NO_VALUE, 30]);
        assert_eq!(avg, 20);
        assert!(i16::average([i16::NO_VALUE]).is_no_value());
        let favg = f32::average([1.0, 2.0, f32::NAN]);
        assert!((favg - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_average_does_not_overflow_in_element_type() {
        // Two values near i16::MAX would overflow a 16-bit accumulator.
        let avg = i16::average([32000, 32000]);
        assert_eq!(avg, 32000);
        let avg = u16::average([65000, 65000]);
        assert_eq!(avg, 65000);
    }

    #[test]
    fn test_little_endian_roundtrip() {
        let mut buf = Vec::new();
        1234i16.write_le(&mut buf);
        (-5.5f32).write_le(&mut buf);
        assert_eq!(buf.len(), i16::BYTES + f32::BYTES);
        assert_eq!(i16::read_le(&buf[..2]), 1234);
        assert_eq!(f32::read_le(&buf[2..]), -5.5);
    }

    #[test]
    fn test_native_tags() {
        assert_eq!(f32::NATIVE_TAG, Some(0));
        assert_eq!(i16::NATIVE_TAG, Some(1));
        assert_eq!(u16::NATIVE_TAG, Some(2));
        assert_eq!(f64::NATIVE_TAG, Some(3));
        assert_eq!(i32::NATIVE_TAG, None);
    }
}
