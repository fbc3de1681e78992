//! Helper macros shared across modules.

/// Declares a closed, string-backed enum.
///
/// The enum serializes as its text form, parses from it with `FromStr`, and
/// exposes `ALL` in declaration order. For ranked vocabularies the variants
/// are declared best-first so `rank()` and `order_case()` agree with the
/// listing order.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident ($label:literal) {
            $( $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            serde::Serialize, serde::Deserialize,
        )]
        $vis enum $name {
            $( #[serde(rename = $text)] $variant ),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$( $name::$variant ),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $name::$variant => $text ),+
                }
            }

            /// Position in `ALL`; zero is the highest rank.
            pub fn rank(&self) -> usize {
                Self::ALL.iter().position(|v| v == self).unwrap_or(Self::ALL.len())
            }

            /// SQL `CASE` expression mapping `column` to `rank()`.
            pub fn order_case(column: &str) -> String {
                let mut sql = format!("CASE {}", column);
                for (rank, value) in Self::ALL.iter().enumerate() {
                    sql.push_str(&format!(" WHEN '{}' THEN {}", value.as_str(), rank));
                }
                sql.push_str(&format!(" ELSE {} END", Self::ALL.len()));
                sql
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $text => Ok($name::$variant), )+
                    other => Err(format!("invalid {}: '{}'", $label, other)),
                }
            }
        }
    };
}
