//! Newtype identifiers for type-safe entity references.
//!
//! Catalog and purchase identifiers are human-typable strings, so the
//! `define_key!` macro wraps `String` rather than an integer. Stock items are
//! the only rows keyed by a database sequence and use `define_id!`.

/// Macro to define a type-safe string key wrapper.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Clone`, `PartialEq`, `Eq`, `PartialOrd`, `Ord`, `Hash`
/// - Conversion methods: `new()`, `as_str()`, `into_inner()`
/// - `sqlx` `Type`, `Encode`, and `Decode` implementations (with `postgres` feature)
///
/// Use the `secret` form for capability tokens: its `Debug` output is redacted.
///
/// # Example
///
/// ```rust
/// # use voucher_store_core::define_key;
/// define_key!(SkuId);
/// define_key!(ApiToken, secret);
///
/// let sku = SkuId::new("gift-50");
/// assert_eq!(sku.as_str(), "gift-50");
/// assert_eq!(format!("{:?}", ApiToken::new("abc")), "ApiToken([REDACTED])");
/// ```
#[macro_export]
macro_rules! define_key {
    ($name:ident) => {
        $crate::define_key!(@common $name, Debug);
    };
    ($name:ident, secret) => {
        $crate::define_key!(@common $name,);

        impl ::core::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}([REDACTED])", stringify!($name))
            }
        }
    };
    (@common $name:ident, $($extra:ident)?) => {
        #[derive(
            $($extra,)?
            Clone,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            Default,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new key from a string value.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the underlying string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Whether the key is the empty string.
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            /// Convert into the underlying string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        #[cfg(feature = "postgres")]
        impl ::sqlx::Type<::sqlx::Postgres> for $name {
            fn type_info() -> ::sqlx::postgres::PgTypeInfo {
                <String as ::sqlx::Type<::sqlx::Postgres>>::type_info()
            }

            fn compatible(ty: &::sqlx::postgres::PgTypeInfo) -> bool {
                <String as ::sqlx::Type<::sqlx::Postgres>>::compatible(ty)
            }
        }

        #[cfg(feature = "postgres")]
        impl<'r> ::sqlx::Decode<'r, ::sqlx::Postgres> for $name {
            fn decode(
                value: ::sqlx::postgres::PgValueRef<'r>,
            ) -> ::core::result::Result<Self, ::sqlx::error::BoxDynError> {
                let value = <String as ::sqlx::Decode<::sqlx::Postgres>>::decode(value)?;
                Ok(Self(value))
            }
        }

        #[cfg(feature = "postgres")]
        impl ::sqlx::Encode<'_, ::sqlx::Postgres> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut ::sqlx::postgres::PgArgumentBuffer,
            ) -> ::std::result::Result<::sqlx::encode::IsNull, ::sqlx::error::BoxDynError> {
                <String as ::sqlx::Encode<::sqlx::Postgres>>::encode_by_ref(&self.0, buf)
            }
        }
    };
}

/// Macro to define a type-safe numeric ID wrapper around `i64`.
///
/// Same shape as [`define_key!`] but for sequence-generated primary keys.
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Create a new ID from an i64 value.
            #[must_use]
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// Get the underlying i64 value.
            #[must_use]
            pub const fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        #[cfg(feature = "postgres")]
        impl ::sqlx::Type<::sqlx::Postgres> for $name {
            fn type_info() -> ::sqlx::postgres::PgTypeInfo {
                <i64 as ::sqlx::Type<::sqlx::Postgres>>::type_info()
            }

            fn compatible(ty: &::sqlx::postgres::PgTypeInfo) -> bool {
                <i64 as ::sqlx::Type<::sqlx::Postgres>>::compatible(ty)
            }
        }

        #[cfg(feature = "postgres")]
        impl<'r> ::sqlx::Decode<'r, ::sqlx::Postgres> for $name {
            fn decode(
                value: ::sqlx::postgres::PgValueRef<'r>,
            ) -> ::core::result::Result<Self, ::sqlx::error::BoxDynError> {
                let id = <i64 as ::sqlx::Decode<::sqlx::Postgres>>::decode(value)?;
                Ok(Self(id))
            }
        }

        #[cfg(feature = "postgres")]
        impl ::sqlx::Encode<'_, ::sqlx::Postgres> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut ::sqlx::postgres::PgArgumentBuffer,
            ) -> ::std::result::Result<::sqlx::encode::IsNull, ::sqlx::error::BoxDynError> {
                <i64 as ::sqlx::Encode<::sqlx::Postgres>>::encode_by_ref(&self.0, buf)
            }
        }
    };
}

define_key!(PurchaseId);
define_key!(VariantId);
define_key!(CountryId);
define_key!(AccessKey, secret);
define_key!(PaymentKey, secret);

define_id!(StockItemId);

/// Country ID used by variants that are not country-specific.
pub const ALL_COUNTRIES: &str = "all";

/// Tax country for customers outside the European Union.
pub const NON_EU: &str = "non-EU";

impl CountryId {
    /// The country ID shared by every variant without per-country stock.
    #[must_use]
    pub fn all() -> Self {
        Self::new(ALL_COUNTRIES)
    }

    /// Whether this is the catch-all country ID.
    #[must_use]
    pub fn is_all(&self) -> bool {
        self.0 == ALL_COUNTRIES
    }

    /// Whether this looks like an ISO 3166-1 alpha-2 code.
    #[must_use]
    pub fn is_iso_code(&self) -> bool {
        self.0.len() == 2 && self.0.bytes().all(|b| b.is_ascii_uppercase())
    }

    /// Whether this is acceptable as the tax country of a purchase.
    #[must_use]
    pub fn is_valid_tax_country(&self) -> bool {
        self.0 == NON_EU || self.is_iso_code()
    }
}

impl PurchaseId {
    /// Normalize staff input: trimmed and upper-cased.
    #[must_use]
    pub fn normalize(input: &str) -> Self {
        Self(input.trim().to_uppercase())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_country_all() {
        assert!(CountryId::all().is_all());
        assert!(!CountryId::new("DE").is_all());
    }

    #[test]
    fn test_country_iso_code() {
        assert!(CountryId::new("DE").is_iso_code());
        assert!(!CountryId::new("de").is_iso_code());
        assert!(!CountryId::new("DEU").is_iso_code());
        assert!(!CountryId::all().is_iso_code());
    }

    #[test]
    fn test_tax_country() {
        assert!(CountryId::new("AT").is_valid_tax_country());
        assert!(CountryId::new(NON_EU).is_valid_tax_country());
        assert!(!CountryId::new("").is_valid_tax_country());
        assert!(!CountryId::all().is_valid_tax_country());
    }

    #[test]
    fn test_secret_keys_are_redacted() {
        let key = AccessKey::new("s3cr3t-access-key");
        let debug = format!("{key:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("s3cr3t"));
        // Display is used to build customer URLs and stays intact.
        assert_eq!(key.to_string(), "s3cr3t-access-key");
    }

    #[test]
    fn test_purchase_id_normalize() {
        assert_eq!(PurchaseId::normalize("  ab12cd ").as_str(), "AB12CD");
    }

    #[test]
    fn test_key_serde_transparent() {
        let json = serde_json::to_string(&VariantId::new("gift-25")).unwrap();
        assert_eq!(json, "\"gift-25\"");
    }
}
