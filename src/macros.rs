//! Declarative helpers shared across modules

/// Declares a `#[repr(u8)]` enum with stable discriminants, plus `From<Enum> for u8`
/// and `TryFrom<u8>` conversions. The byte value is what goes into record headers
/// and keys; serde uses the variant names.
macro_rules! byte_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident = $value:expr),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
        #[repr(u8)]
        $vis enum $name {
            $($(#[$vmeta])* $variant = $value),+
        }

        impl From<$name> for u8 {
            fn from(value: $name) -> u8 {
                value as u8
            }
        }

        impl TryFrom<u8> for $name {
            type Error = u8;

            fn try_from(value: u8) -> Result<Self, u8> {
                $(
                    if value == $value {
                        return Ok($name::$variant);
                    }
                )+
                Err(value)
            }
        }
    };
}
