/// Generates a non-exhaustive enum of wire names that share a common prefix.
///
/// Produces: enum definition, `ALL`, `as_str()` (bare name), `wire_name()`
/// (prefixed name), `Display`, `AsRef<str>` and a case-insensitive `FromStr`
/// that accepts the name with or without the prefix. The error type is a
/// tuple struct over `String`, defined next to the enum.
///
/// # Example
///
/// ```ignore
/// define_wire_enum! {
///     error_type: ParseMyEnumError,
///     prefix: "my_",
///     /// Doc comment for the enum.
///     pub enum MyEnum {
///         Foo => "foo",
///         Bar => "bar",
///     }
/// }
/// assert_eq!(MyEnum::Foo.wire_name(), "my_foo");
/// ```
macro_rules! define_wire_enum {
    (
        error_type: $Err:ident,
        prefix: $prefix:literal,
        $(#[$enum_meta:meta])*
        $vis:vis enum $Name:ident {
            $(
                $(#[$var_meta:meta])*
                $variant:ident => $wire:literal
            ),+ $(,)?
        }
    ) => {
        $(#[$enum_meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[non_exhaustive]
        #[allow(missing_docs)]
        $vis enum $Name {
            $(
                $(#[$var_meta])*
                $variant,
            )+
        }

        impl $Name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$Name] = &[ $( $Name::$variant, )+ ];

            /// Name without the prefix.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $Name::$variant => $wire, )+
                }
            }

            /// Name as it appears on the wire, prefix included.
            pub fn wire_name(&self) -> &'static str {
                match self {
                    $( $Name::$variant => concat!($prefix, $wire), )+
                }
            }
        }

        impl std::fmt::Display for $Name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl AsRef<str> for $Name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl std::str::FromStr for $Name {
            type Err = $Err;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let bare = match s.get(..$prefix.len()) {
                    Some(head) if head.eq_ignore_ascii_case($prefix) => &s[$prefix.len()..],
                    _ => s,
                };
                $Name::ALL
                    .iter()
                    .copied()
                    .find(|v| bare.eq_ignore_ascii_case(v.as_str()))
                    .ok_or_else(|| $Err(s.to_string()))
            }
        }
    };
}
