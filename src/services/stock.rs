//! Availability resolution and request validation for (product, variant)
//! pairs. Pure functions: callers fetch catalog rows fresh and pass them in,
//! so no stock figure is ever cached here.

use crate::entities::{product, product_variant};
use crate::errors::ServiceError;
use serde::{Serialize, Serializer};
use std::fmt;

/// Sellable quantity for a (product, variant) pair.
///
/// `Unbounded` marks untracked bare-product stock; it always passes
/// validation and serializes as null, never as a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Finite(i32),
    Unbounded,
}

impl Availability {
    /// Whether `requested` units can be committed against this availability.
    pub fn allows(&self, requested: i32) -> bool {
        match self {
            Availability::Finite(available) => requested <= *available,
            Availability::Unbounded => true,
        }
    }

    pub fn as_finite(&self) -> Option<i32> {
        match self {
            Availability::Finite(available) => Some(*available),
            Availability::Unbounded => None,
        }
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Availability::Finite(available) => write!(f, "{}", available),
            Availability::Unbounded => write!(f, "unbounded"),
        }
    }
}

impl Serialize for Availability {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Availability::Finite(available) => serializer.serialize_i32(*available),
            Availability::Unbounded => serializer.serialize_none(),
        }
    }
}

/// Resolves the variant a caller-supplied key refers to, matching by sku or
/// by stringified variant id.
pub fn resolve_variant<'a>(
    variants: &'a [product_variant::Model],
    key: &str,
) -> Option<&'a product_variant::Model> {
    variants.iter().find(|variant| variant.matches_key(key))
}

/// Computes the sellable quantity for a product and optional variant key.
///
/// Products with variants require a key that resolves to exactly one
/// variant; bare products fall back to their own stock field, with a missing
/// field meaning untracked (unbounded) availability.
pub fn availability(
    product: &product::Model,
    variants: &[product_variant::Model],
    variant_key: Option<&str>,
) -> Result<Availability, ServiceError> {
    if !variants.is_empty() {
        let key = variant_key
            .ok_or_else(|| ServiceError::VariantRequired(product.name.clone()))?;
        let variant = resolve_variant(variants, key)
            .ok_or_else(|| ServiceError::VariantNotFound(key.to_string()))?;
        return Ok(Availability::Finite(variant.stock));
    }

    Ok(match product.stock {
        Some(stock) => Availability::Finite(stock),
        None => Availability::Unbounded,
    })
}

/// Validates a requested quantity against availability.
pub fn validate_request(
    available: Availability,
    requested: i32,
    product_name: &str,
) -> Result<(), ServiceError> {
    if available.allows(requested) {
        Ok(())
    } else {
        Err(ServiceError::InsufficientStock(format!(
            "{} has {} in stock, requested {}",
            product_name, available, requested
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn test_product(stock: Option<i32>) -> product::Model {
        product::Model {
            id: Uuid::new_v4(),
            name: "Trail Jacket".to_string(),
            description: "Lightweight shell".to_string(),
            price: dec!(120.00),
            image: "jacket.jpg".to_string(),
            category: "outerwear".to_string(),
            is_featured: false,
            stock,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn test_variant(product_id: Uuid, sku: Option<&str>, stock: i32) -> product_variant::Model {
        product_variant::Model {
            id: Uuid::new_v4(),
            product_id,
            sku: sku.map(String::from),
            color: Some("black".to_string()),
            size: Some("M".to_string()),
            price: None,
            stock,
            image: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn variants_present_without_key_is_variant_required() {
        let product = test_product(None);
        let variants = vec![test_variant(product.id, Some("JKT-M"), 3)];

        let err = availability(&product, &variants, None).unwrap_err();
        assert!(matches!(err, ServiceError::VariantRequired(_)));
    }

    #[test]
    fn unresolvable_key_is_variant_not_found() {
        let product = test_product(None);
        let variants = vec![test_variant(product.id, Some("JKT-M"), 3)];

        let err = availability(&product, &variants, Some("JKT-XL")).unwrap_err();
        assert!(matches!(err, ServiceError::VariantNotFound(_)));
    }

    #[test]
    fn key_resolves_by_sku_or_by_variant_id() {
        let product = test_product(None);
        let variant = test_variant(product.id, Some("JKT-M"), 5);
        let id_key = variant.id.to_string();
        let variants = vec![variant];

        assert_eq!(
            availability(&product, &variants, Some("JKT-M")).unwrap(),
            Availability::Finite(5)
        );
        assert_eq!(
            availability(&product, &variants, Some(&id_key)).unwrap(),
            Availability::Finite(5)
        );
    }

    #[test]
    fn bare_product_uses_own_stock_or_unbounded() {
        let tracked = test_product(Some(7));
        assert_eq!(
            availability(&tracked, &[], None).unwrap(),
            Availability::Finite(7)
        );

        let untracked = test_product(None);
        let available = availability(&untracked, &[], None).unwrap();
        assert_eq!(available, Availability::Unbounded);
        assert!(available.allows(i32::MAX));
    }

    #[test]
    fn validate_request_rejects_over_commit() {
        assert!(validate_request(Availability::Finite(2), 2, "x").is_ok());
        let err = validate_request(Availability::Finite(2), 3, "x").unwrap_err();
        assert!(matches!(err, ServiceError::InsufficientStock(_)));
    }

    #[test]
    fn unbounded_never_serializes_as_a_number() {
        let json = serde_json::to_string(&Availability::Unbounded).unwrap();
        assert_eq!(json, "null");
        let json = serde_json::to_string(&Availability::Finite(4)).unwrap();
        assert_eq!(json, "4");
    }
}
