//! Input validation for API requests.
//!
//! Each validator returns `Err(message)` for a single field. Handlers collect
//! them with the `ValidationErrorBuilder` from the `error` module.

use lazy_static::lazy_static;
use regex::Regex;
use std::net::IpAddr;

use crate::db::TAG_SEPARATOR;

pub const MAX_USERNAME_LEN: usize = 80;
pub const MAX_DEVICE_NAME_LEN: usize = 80;
pub const MAX_DESCRIPTION_LEN: usize = 200;
pub const MAX_EMAIL_LEN: usize = 120;

lazy_static! {
    /// Six hex octets separated by `:` or `-`, one separator style per address
    static ref MAC_ADDRESS_REGEX: Regex = Regex::new(
        r"^(([0-9A-Fa-f]{2}:){5}|([0-9A-Fa-f]{2}-){5})[0-9A-Fa-f]{2}$"
    ).unwrap();

    /// Something@domain.tld, no whitespace
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[^@\s]+@[^@\s]+\.[^@\s]+$"
    ).unwrap();
}

pub fn validate_username(username: &str) -> Result<(), String> {
    if username.trim().is_empty() {
        return Err("Username is required".to_string());
    }

    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(format!(
            "Username is too long (max {} characters)",
            MAX_USERNAME_LEN
        ));
    }

    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }

    if email.len() > MAX_EMAIL_LEN {
        return Err(format!("Email is too long (max {} characters)", MAX_EMAIL_LEN));
    }

    if !EMAIL_REGEX.is_match(email) {
        return Err("Invalid email format".to_string());
    }

    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), String> {
    if password.is_empty() {
        return Err("Password is required".to_string());
    }
    Ok(())
}

pub fn validate_device_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("Device name is required".to_string());
    }

    if name.chars().count() > MAX_DEVICE_NAME_LEN {
        return Err(format!(
            "Device name is too long (max {} characters)",
            MAX_DEVICE_NAME_LEN
        ));
    }

    Ok(())
}

/// IPv4 or IPv6
pub fn validate_ip_address(ip: &str) -> Result<(), String> {
    ip.parse::<IpAddr>()
        .map(|_| ())
        .map_err(|_| "Invalid IP address".to_string())
}

pub fn validate_mac_address(mac: &str) -> Result<(), String> {
    if !MAC_ADDRESS_REGEX.is_match(mac) {
        return Err("Invalid MAC address format (expected XX:XX:XX:XX:XX:XX)".to_string());
    }
    Ok(())
}

pub fn validate_description(description: &str) -> Result<(), String> {
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(format!(
            "Description is too long (max {} characters)",
            MAX_DESCRIPTION_LEN
        ));
    }
    Ok(())
}

/// Tags are stored comma-joined, so a tag may not itself contain a comma.
pub fn validate_tags(tags: &[String]) -> Result<(), String> {
    for tag in tags {
        if tag.trim().is_empty() {
            return Err("Tags cannot be empty".to_string());
        }
        if tag.contains(TAG_SEPARATOR) {
            return Err(format!("Tag '{}' cannot contain '{}'", tag, TAG_SEPARATOR));
        }
    }
    Ok(())
}
