//! Signed, time-limited attendance tokens carried in check-in QR codes.
//!
//! Format: `kkg-absensi:<event_id>:<expires_at_ms>:<signature>`, where the
//! signature is the first 16 hex characters of
//! `HMAC-SHA256(secret, "<event_id>:<expires_at_ms>")`.
//!
//! Tokens are not single-use. A scan within the validity window always
//! decodes; duplicate check-ins are rejected by the attendance table.

use chrono::Utc;
use hmac::{Hmac, Mac};
use qrcode::QrCode;
use qrcode::render::svg;
use sha2::Sha256;
use thiserror::Error;

use crate::crypto::password::constant_time_str_eq;
use crate::error::{AppError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Literal prefix of every attendance token.
pub const TOKEN_PREFIX: &str = "kkg-absensi:";
/// Hex characters of the MAC kept in the token.
pub const SIGNATURE_HEX_LEN: usize = 16;
/// Validity used when the caller does not pick one.
pub const DEFAULT_VALIDITY_MINUTES: i64 = 60;

/// Why a scanned token was refused.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceTokenError {
    /// Malformed, or the signature does not match.
    #[error("Invalid attendance token")]
    Invalid,
    /// Well-formed but past its expiry.
    #[error("Attendance token for event {event_id} has expired")]
    Expired { event_id: i64 },
}

impl AttendanceTokenError {
    pub fn code(&self) -> &'static str {
        match self {
            AttendanceTokenError::Invalid => "ATTENDANCE_TOKEN_INVALID",
            AttendanceTokenError::Expired { .. } => "ATTENDANCE_TOKEN_EXPIRED",
        }
    }
}

/// The verified content of an attendance token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttendanceClaim {
    pub event_id: i64,
    pub expires_at_ms: i64,
}

/// Signs and verifies attendance tokens under one server secret.
#[derive(Clone)]
pub struct AttendanceTokenCodec {
    mac: HmacSha256,
}

impl AttendanceTokenCodec {
    /// Creates a codec keyed with `secret`.
    pub fn new(secret: &[u8]) -> Result<Self> {
        if secret.is_empty() {
            return Err(AppError::Internal(
                "Attendance token secret must not be empty".to_string(),
            ));
        }

        let mac = HmacSha256::new_from_slice(secret)
            .map_err(|e| AppError::Internal(format!("Invalid attendance secret: {}", e)))?;

        Ok(Self { mac })
    }

    fn sign(&self, event_id: i64, expires_at_ms: i64) -> String {
        let mut mac = self.mac.clone();
        mac.update(format!("{}:{}", event_id, expires_at_ms).as_bytes());
        let digest = hex::encode(mac.finalize().into_bytes());
        digest[..SIGNATURE_HEX_LEN].to_string()
    }

    /// Issues a token for `event_id` valid for `validity_minutes` from now.
    pub fn encode(&self, event_id: i64, validity_minutes: i64) -> String {
        self.encode_at(event_id, validity_minutes, now_ms())
    }

    pub fn encode_at(&self, event_id: i64, validity_minutes: i64, now_ms: i64) -> String {
        let expires_at_ms = now_ms.saturating_add(validity_minutes.saturating_mul(60_000));
        let signature = self.sign(event_id, expires_at_ms);
        format!("{}{}:{}:{}", TOKEN_PREFIX, event_id, expires_at_ms, signature)
    }

    /// Verifies a scanned token against the current time.
    pub fn decode(&self, token: &str) -> std::result::Result<AttendanceClaim, AttendanceTokenError> {
        self.decode_at(token, now_ms())
    }

    /// Verifies a scanned token against `now_ms`.
    ///
    /// Expiry is checked before the signature so an expired token still
    /// reports its event id.
    pub fn decode_at(
        &self,
        token: &str,
        now_ms: i64,
    ) -> std::result::Result<AttendanceClaim, AttendanceTokenError> {
        if !token.starts_with(TOKEN_PREFIX) {
            return Err(AttendanceTokenError::Invalid);
        }

        let segments: Vec<&str> = token.split(':').collect();
        let [_, event_id, expires_at_ms, signature] = segments.as_slice() else {
            return Err(AttendanceTokenError::Invalid);
        };

        let event_id = parse_decimal(event_id).ok_or(AttendanceTokenError::Invalid)?;
        let expires_at_ms = parse_decimal(expires_at_ms).ok_or(AttendanceTokenError::Invalid)?;

        if now_ms > expires_at_ms {
            return Err(AttendanceTokenError::Expired { event_id });
        }

        let expected = self.sign(event_id, expires_at_ms);
        if !constant_time_str_eq(&expected, signature) {
            return Err(AttendanceTokenError::Invalid);
        }

        Ok(AttendanceClaim {
            event_id,
            expires_at_ms,
        })
    }
}

/// Renders a token as an SVG QR code.
pub fn render_qr_svg(token: &str) -> Result<String> {
    let code = QrCode::new(token.as_bytes())
        .map_err(|e| AppError::Internal(format!("QR encoding failed: {}", e)))?;

    Ok(code
        .render::<svg::Color>()
        .min_dimensions(256, 256)
        .dark_color(svg::Color("#000000"))
        .light_color(svg::Color("#ffffff"))
        .build())
}

/// Parses a segment only when it is written exactly as `encode` writes it.
///
/// Rejects `+42`, `042` and `-0`, which would otherwise share a signature
/// with `42` and `0`.
fn parse_decimal(segment: &str) -> Option<i64> {
    let value: i64 = segment.parse().ok()?;
    (value.to_string() == segment).then_some(value)
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test-secret-that-is-long-enough-123456";

    fn codec() -> AttendanceTokenCodec {
        AttendanceTokenCodec::new(SECRET).unwrap()
    }

    #[test]
    fn fresh_token_decodes_to_its_event() {
        let codec = codec();
        let token = codec.encode(42, DEFAULT_VALIDITY_MINUTES);
        let claim = codec.decode(&token).unwrap();
        assert_eq!(claim.event_id, 42);
    }

    #[test]
    fn token_has_documented_layout() {
        let token = codec().encode_at(7, 60, 1_000);
        let parts: Vec<&str> = token.split(':').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "kkg-absensi");
        assert_eq!(parts[1], "7");
        assert_eq!(parts[2], "3601000");
        assert_eq!(parts[3].len(), SIGNATURE_HEX_LEN);
        assert!(parts[3].chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
    }

    #[test]
    fn negative_validity_is_expired() {
        let codec = codec();
        let token = codec.encode(9, -1);
        assert_eq!(
            codec.decode(&token),
            Err(AttendanceTokenError::Expired { event_id: 9 })
        );
    }

    #[test]
    fn advancing_the_clock_expires_the_token() {
        let codec = codec();
        let token = codec.encode_at(5, 60, 0);
        assert!(codec.decode_at(&token, 3_600_000).is_ok());
        assert_eq!(
            codec.decode_at(&token, 3_600_001),
            Err(AttendanceTokenError::Expired { event_id: 5 })
        );
    }

    #[test]
    fn flipping_any_signature_character_invalidates() {
        let codec = codec();
        let token = codec.encode_at(42, 60, 0);
        let sig_start = token.rfind(':').unwrap() + 1;

        for i in sig_start..token.len() {
            let mut bytes = token.clone().into_bytes();
            bytes[i] = if bytes[i] == b'0' { b'1' } else { b'0' };
            let tampered = String::from_utf8(bytes).unwrap();
            assert_eq!(
                codec.decode_at(&tampered, 0),
                Err(AttendanceTokenError::Invalid)
            );
        }
    }

    #[test]
    fn tampered_event_id_invalidates() {
        let codec = codec();
        let token = codec.encode_at(42, 60, 0);
        let tampered = token.replacen(":42:", ":43:", 1);
        assert_eq!(codec.decode_at(&tampered, 0), Err(AttendanceTokenError::Invalid));
    }

    #[test]
    fn malformed_tokens_are_invalid() {
        let codec = codec();
        for token in [
            "not-a-token",
            "kkg-absensi:1:2",
            "kkg-absensi:abc:123:deadbeef",
            "kkg-absensi:1:xyz:deadbeef",
            "kkg-absensi:1:2:3:4",
            "",
        ] {
            assert_eq!(codec.decode_at(token, 0), Err(AttendanceTokenError::Invalid));
        }
    }

    #[test]
    fn non_canonical_numbers_are_invalid() {
        let codec = codec();
        let token = codec.encode_at(42, 60, 0);
        for (from, to) in [(":42:", ":+42:"), (":42:", ":042:"), (":3600000:", ":+3600000:"), (":3600000:", ":03600000:")] {
            let respelled = token.replacen(from, to, 1);
            assert_ne!(respelled, token);
            assert_eq!(codec.decode_at(&respelled, 0), Err(AttendanceTokenError::Invalid));
        }
    }

    #[test]
    fn expired_forgery_reports_expired_with_event() {
        let codec = codec();
        let forged = "kkg-absensi:77:1000:0000000000000000";
        assert_eq!(
            codec.decode_at(forged, 1_001),
            Err(AttendanceTokenError::Expired { event_id: 77 })
        );
        assert_eq!(codec.decode_at(forged, 1_000), Err(AttendanceTokenError::Invalid));
    }

    #[test]
    fn other_secret_cannot_verify() {
        let token = codec().encode_at(1, 60, 0);
        let other = AttendanceTokenCodec::new(b"a-completely-different-secret-value!!").unwrap();
        assert_eq!(other.decode_at(&token, 0), Err(AttendanceTokenError::Invalid));
    }

    #[test]
    fn empty_secret_is_rejected() {
        assert!(AttendanceTokenCodec::new(b"").is_err());
    }

    #[test]
    fn qr_svg_is_rendered() {
        let svg = render_qr_svg(&codec().encode(3, 60)).unwrap();
        assert!(svg.contains("<svg"));
    }
}
