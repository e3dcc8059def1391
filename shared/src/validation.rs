//! Validation utilities for BarStockWise

use rust_decimal::Decimal;

/// Validate that a payment or sale amount is strictly positive
pub fn validate_positive_amount(amount: Decimal) -> Result<(), &'static str> {
    if amount <= Decimal::ZERO {
        return Err("Amount must be positive");
    }
    Ok(())
}

/// Validate an item quantity
pub fn validate_quantity(quantity: i32) -> Result<(), &'static str> {
    if quantity <= 0 {
        return Err("Quantity must be positive");
    }
    Ok(())
}

/// Validate email format (basic check)
pub fn validate_email(email: &str) -> Result<(), &'static str> {
    if email.contains('@') && email.contains('.') && email.len() >= 5 {
        Ok(())
    } else {
        Err("Invalid email format")
    }
}

/// Validate a Burundian phone number
/// Accepts: 79123456, 79-12-34-56, +25779123456
pub fn validate_burundi_phone(phone: &str) -> Result<(), &'static str> {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();

    // Local mobile: 8 digits starting with 6 or 7
    if digits.len() == 8 && (digits.starts_with('6') || digits.starts_with('7')) {
        return Ok(());
    }
    // International: 257 prefix plus 8 digits
    if digits.len() == 11 && digits.starts_with("257") {
        return Ok(());
    }
    Err("Invalid phone number format")
}

/// Validate a sale reference code (SALE- followed by digits)
pub fn validate_sale_reference(reference: &str) -> Result<(), &'static str> {
    let Some(rest) = reference.strip_prefix("SALE-") else {
        return Err("Reference must start with SALE-");
    };
    if rest.is_empty() || !rest.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err("Reference suffix must be alphanumeric");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn amounts_must_be_positive() {
        assert!(validate_positive_amount(Decimal::from_str("0.01").unwrap()).is_ok());
        assert!(validate_positive_amount(Decimal::ZERO).is_err());
        assert!(validate_positive_amount(Decimal::from_str("-5").unwrap()).is_err());
    }

    #[test]
    fn phone_formats() {
        assert!(validate_burundi_phone("79123456").is_ok());
        assert!(validate_burundi_phone("79-12-34-56").is_ok());
        assert!(validate_burundi_phone("+25779123456").is_ok());
        assert!(validate_burundi_phone("12345").is_err());
        assert!(validate_burundi_phone("0812345678").is_err());
    }

    #[test]
    fn sale_references() {
        assert!(validate_sale_reference("SALE-0042").is_ok());
        assert!(validate_sale_reference("SALE-").is_err());
        assert!(validate_sale_reference("INV-0042").is_err());
    }
}
