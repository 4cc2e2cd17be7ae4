//! Pyth push-oracle (`PriceUpdateV2`) account decoding.

use super::bytes::ByteReader;
use super::{OraclePrice, PriceWithConfidence};
use anyhow::{bail, Result};
use chrono::{DateTime, Utc};

/// Verification level of a posted price update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationLevel {
    /// Verified by a subset of guardians
    Partial { num_signatures: u8 },
    /// Verified by the full guardian set
    Full,
}

/// Price message carried by a `PriceUpdateV2` account.
#[derive(Debug, Clone, PartialEq)]
pub struct PythPriceMessage {
    /// Pyth feed identifier
    pub feed_id: [u8; 32],
    /// Raw price (scaled by `10^exponent`)
    pub price: i64,
    /// Raw confidence
    pub conf: u64,
    /// Decimal exponent
    pub exponent: i32,
    /// Publish timestamp
    pub publish_time: i64,
    /// Previous publish timestamp
    pub prev_publish_time: i64,
    /// Raw EMA price
    pub ema_price: i64,
    /// Raw EMA confidence
    pub ema_conf: u64,
}

/// Decoded `PriceUpdateV2` account.
#[derive(Debug, Clone, PartialEq)]
pub struct PythPriceUpdate {
    /// Write authority of the account
    pub write_authority: [u8; 32],
    /// Verification level
    pub verification_level: VerificationLevel,
    /// Price message
    pub message: PythPriceMessage,
    /// Slot the update was posted in
    pub posted_slot: u64,
}

impl PythPriceUpdate {
    /// Decode from raw account data.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(data);
        reader.skip(8)?; // discriminator
        let write_authority = reader.take::<32>()?;

        let verification_level = match reader.u8()? {
            0 => VerificationLevel::Partial {
                num_signatures: reader.u8()?,
            },
            1 => VerificationLevel::Full,
            other => bail!("unknown verification level tag {}", other),
        };

        let message = PythPriceMessage {
            feed_id: reader.take::<32>()?,
            price: reader.i64()?,
            conf: reader.u64()?,
            exponent: reader.i32()?,
            publish_time: reader.i64()?,
            prev_publish_time: reader.i64()?,
            ema_price: reader.i64()?,
            ema_conf: reader.u64()?,
        };
        let posted_slot = reader.u64()?;

        Ok(Self {
            write_authority,
            verification_level,
            message,
            posted_slot,
        })
    }

    /// Feed id as lowercase hex.
    pub fn feed_id_hex(&self) -> String {
        hex::encode(self.message.feed_id)
    }

    /// Publish time as a UTC datetime.
    pub fn publish_time_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.message.publish_time, 0)
    }

    /// Convert to a price record: spot from the price, time-weighted from the EMA.
    ///
    /// Confidence is multiplied by `conf_multiple` before being capped.
    pub fn to_oracle_price(&self, conf_multiple: f64, max_confidence_ratio: f64) -> OraclePrice {
        let msg = &self.message;
        let scale = 10f64.powi(msg.exponent);

        let realtime = PriceWithConfidence::new(
            msg.price as f64 * scale,
            msg.conf as f64 * scale * conf_multiple,
            max_confidence_ratio,
        );
        let time_weighted = PriceWithConfidence::new(
            msg.ema_price as f64 * scale,
            msg.ema_conf as f64 * scale * conf_multiple,
            max_confidence_ratio,
        );

        OraclePrice {
            realtime,
            time_weighted,
            timestamp: Some(msg.publish_time),
        }
    }
}

/// Lay out a fully verified `PriceUpdateV2` account.
///
/// Used to build offline snapshots; publish time and slot are fixed.
pub fn encode_price_update(price: i64, conf: u64, exponent: i32, ema_price: i64, ema_conf: u64) -> Vec<u8> {
    let mut data = vec![0u8; 8];
    data.extend_from_slice(&[7u8; 32]);
    data.push(1); // Full
    data.extend_from_slice(&[9u8; 32]);
    data.extend_from_slice(&price.to_le_bytes());
    data.extend_from_slice(&conf.to_le_bytes());
    data.extend_from_slice(&exponent.to_le_bytes());
    data.extend_from_slice(&1_700_000_000i64.to_le_bytes());
    data.extend_from_slice(&1_699_999_999i64.to_le_bytes());
    data.extend_from_slice(&ema_price.to_le_bytes());
    data.extend_from_slice(&ema_conf.to_le_bytes());
    data.extend_from_slice(&250_000_000u64.to_le_bytes());
    data
}
