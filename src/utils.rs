//! Identifier generation.

use bech32::Bech32m;
use uuid7::uuid7;

pub const LEAVE_REQUEST_HRP: &str = "leave_";
pub const BALANCE_HRP: &str = "bal_";
pub const AUDIT_HRP: &str = "audit_";

// construct a unique id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}
