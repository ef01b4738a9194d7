/// Configuration macros
///
/// `config_struct!` declares a configuration section with its defaults inline:
/// field name, type and default value in one place. It generates the struct
/// with public fields, a `Default` impl and serde support with `#[serde(default)]`
/// so partial TOML files fill missing keys from the defaults.
///
/// ```ignore
/// config_struct! {
///     pub struct HeartbeatConfig {
///         interval_secs: u64 = 120,
///     }
/// }
/// ```
#[macro_export]
macro_rules! config_struct {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                $field_name:ident: $field_type:ty = $default_value:expr
            ),*
            $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
        #[serde(default)]
        $vis struct $name {
            $(
                $(#[$field_meta])*
                pub $field_name: $field_type,
            )*
        }

        impl Default for $name {
            fn default() -> Self {
                Self {
                    $(
                        $field_name: $default_value,
                    )*
                }
            }
        }
    };
}
