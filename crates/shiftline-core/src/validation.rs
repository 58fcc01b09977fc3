//! # Validation Module
//!
//! Request validation that runs before any transaction opens.
//!
//! ## Usage
//! ```rust
//! use shiftline_core::pricing::LineRequest;
//! use shiftline_core::validation::validate_lines;
//!
//! assert!(validate_lines(&[LineRequest::new("prod-1", 2)]).is_ok());
//! assert!(validate_lines(&[]).is_err());
//! ```

use crate::error::ValidationError;
use crate::pricing::LineRequest;
use crate::{MAX_ITEM_QUANTITY, MAX_ORDER_LINES};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validates a non-empty identifier.
pub fn validate_id(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates a line quantity.
pub fn validate_quantity(quantity: i64) -> ValidationResult<()> {
    if !(1..=MAX_ITEM_QUANTITY).contains(&quantity) {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }
    Ok(())
}

/// Validates the requested lines of an order.
///
/// ## Rules
/// - At least one line, at most [`MAX_ORDER_LINES`]
/// - Every line names a product
/// - Every quantity is within `1..=MAX_ITEM_QUANTITY`
pub fn validate_lines(lines: &[LineRequest]) -> ValidationResult<()> {
    if lines.is_empty() {
        return Err(ValidationError::Required {
            field: "items".to_string(),
        });
    }
    if lines.len() > MAX_ORDER_LINES {
        return Err(ValidationError::TooMany {
            field: "items".to_string(),
            max: MAX_ORDER_LINES,
        });
    }
    for line in lines {
        validate_id("productId", &line.product_id)?;
        validate_quantity(line.quantity)?;
    }
    Ok(())
}

/// Validates a batch of order ids for dispatch operations.
pub fn validate_order_ids(ids: &[String]) -> ValidationResult<()> {
    if ids.is_empty() {
        return Err(ValidationError::Required {
            field: "orderIds".to_string(),
        });
    }
    if ids.len() > MAX_ORDER_LINES {
        return Err(ValidationError::TooMany {
            field: "orderIds".to_string(),
            max: MAX_ORDER_LINES,
        });
    }
    ids.iter().try_for_each(|id| validate_id("orderId", id))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantity_bounds() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(MAX_ITEM_QUANTITY).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-3).is_err());
        assert!(validate_quantity(MAX_ITEM_QUANTITY + 1).is_err());
    }

    #[test]
    fn test_lines() {
        assert!(matches!(
            validate_lines(&[]),
            Err(ValidationError::Required { field }) if field == "items"
        ));
        assert!(validate_lines(&[LineRequest::new("", 1)]).is_err());
        assert!(validate_lines(&[LineRequest::new("p", 0)]).is_err());

        let too_many: Vec<_> = (0..=MAX_ORDER_LINES)
            .map(|i| LineRequest::new(format!("p{i}"), 1))
            .collect();
        assert!(matches!(
            validate_lines(&too_many),
            Err(ValidationError::TooMany { .. })
        ));
    }

    #[test]
    fn test_order_ids() {
        assert!(validate_order_ids(&[]).is_err());
        assert!(validate_order_ids(&["a".to_string(), " ".to_string()]).is_err());
        assert!(validate_order_ids(&["a".to_string()]).is_ok());
    }
}
