//! Shell command assembly from declarative flag tables.

use perfnet_params::{EnvMap, ParamMap, ParamValue};

/// How a parameter is rendered on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagForm {
    /// `flag value`, list items joined with commas.
    Spaced,
    /// `flag=value`, list items joined with commas.
    Assigned,
    /// `flag value` once per list item.
    Repeated,
}

/// Mapping of a parameter name to a command line flag.
#[derive(Debug, Clone, Copy)]
pub struct Flag {
    pub param: &'static str,
    pub flag: &'static str,
    pub form: FlagForm,
}

impl Flag {
    pub const fn spaced(param: &'static str, flag: &'static str) -> Self {
        Self {
            param,
            flag,
            form: FlagForm::Spaced,
        }
    }

    pub const fn assigned(param: &'static str, flag: &'static str) -> Self {
        Self {
            param,
            flag,
            form: FlagForm::Assigned,
        }
    }

    pub const fn repeated(param: &'static str, flag: &'static str) -> Self {
        Self {
            param,
            flag,
            form: FlagForm::Repeated,
        }
    }
}

/// Builder for a single shell command line.
///
/// Flags are emitted in table order, never in map order, so the same configuration
/// always produces the same text.
#[derive(Debug, Clone)]
pub struct CommandLine {
    parts: Vec<String>,
}

impl CommandLine {
    /// Start a command with the given environment prefix and executable.
    pub fn new(env: &EnvMap, executable: &str) -> Self {
        let mut parts = env
            .iter()
            .map(|(key, value)| format!("{key}={}", quote(value)))
            .collect::<Vec<_>>();
        parts.push(executable.to_owned());
        Self { parts }
    }

    /// Append a raw argument.
    pub fn arg(&mut self, arg: impl Into<String>) -> &mut Self {
        self.parts.push(arg.into());
        self
    }

    /// Append a flag followed by its value.
    pub fn arg_value(&mut self, flag: &str, value: impl ToString) -> &mut Self {
        self.parts.push(flag.to_owned());
        self.parts.push(quote(&value.to_string()));
        self
    }

    /// Append the flags of all parameters in `table` that are set in `args`.
    ///
    /// Parameters not mentioned in the table are ignored.
    pub fn flags(&mut self, table: &[Flag], args: &ParamMap) -> &mut Self {
        for entry in table {
            if let Some(value) = args.get(entry.param) {
                self.flag(entry, value);
            }
        }
        self
    }

    fn flag(&mut self, entry: &Flag, value: &ParamValue) {
        match value {
            ParamValue::Bool(true) => {
                self.parts.push(entry.flag.to_owned());
            }
            ParamValue::Bool(false) => {}
            ParamValue::Str(value) if value.is_empty() => {}
            ParamValue::List(items) if items.is_empty() => {}
            ParamValue::List(items) if entry.form == FlagForm::Repeated => {
                for item in items {
                    self.arg_value(entry.flag, item);
                }
            }
            value => match entry.form {
                FlagForm::Spaced | FlagForm::Repeated => {
                    self.arg_value(entry.flag, value);
                }
                FlagForm::Assigned => {
                    self.parts
                        .push(format!("{}={}", entry.flag, quote(&value.to_string())));
                }
            },
        }
    }

    /// Render the command as a single shell line.
    pub fn finish(&self) -> String {
        self.parts.join(" ")
    }
}

/// Characters that require a value to be single-quoted.
const SPECIAL: &[char] = &[
    ' ', '\t', '\n', '"', '\'', '$', '`', '\\', ';', '&', '|', '<', '>', '(', ')', '*', '?',
    '[', '#',
];

/// Quote a value for a POSIX shell if it contains special characters.
pub fn quote(value: &str) -> String {
    if value.is_empty() || value.contains(SPECIAL) {
        format!("'{}'", value.replace('\'', r#"'"'"'"#))
    } else {
        value.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &[Flag] = &[
        Flag::spaced("parallel_streams", "-P"),
        Flag::spaced("reverse", "-R"),
        Flag::assigned("rx_queues", "--rxq"),
        Flag::repeated("allow_pci", "-a"),
        Flag::spaced("cpu_freq", "-F"),
    ];

    fn args(entries: Vec<(&str, ParamValue)>) -> ParamMap {
        entries
            .into_iter()
            .map(|(key, value)| (key.to_owned(), value))
            .collect()
    }

    #[test]
    fn test_flag_formatting() {
        let args = args(vec![
            ("cpu_freq", 2.5.into()),
            ("allow_pci", vec!["0000:01:00.0", "0000:01:00.1"].into()),
            ("rx_queues", 4.into()),
            ("reverse", true.into()),
            ("parallel_streams", 8.into()),
            ("unknown", 1.into()),
        ]);
        let command = CommandLine::new(&EnvMap::new(), "tool")
            .flags(TABLE, &args)
            .finish();
        assert_eq!(
            command,
            "tool -P 8 -R --rxq=4 -a 0000:01:00.0 -a 0000:01:00.1 -F 2.50"
        );
    }

    #[test]
    fn test_false_and_empty_omitted() {
        let args = args(vec![
            ("reverse", false.into()),
            ("allow_pci", ParamValue::List(Vec::new())),
            ("rx_queues", "".into()),
        ]);
        let command = CommandLine::new(&EnvMap::new(), "tool")
            .flags(TABLE, &args)
            .finish();
        assert_eq!(command, "tool");
    }

    #[test]
    fn test_env_prefix() {
        let mut env = EnvMap::new();
        env.insert("B".to_owned(), "it's here".to_owned());
        env.insert("A".to_owned(), "1".to_owned());
        let command = CommandLine::new(&env, "tool").finish();
        assert_eq!(command, r#"A=1 B='it'"'"'s here' tool"#);
    }

    #[test]
    fn test_quote() {
        assert_eq!(quote("plain"), "plain");
        assert_eq!(quote("$HOME"), "'$HOME'");
        assert_eq!(quote("a b"), "'a b'");
        assert_eq!(quote("a;reboot"), "'a;reboot'");
        assert_eq!(quote("x|y&z"), "'x|y&z'");
        assert_eq!(quote("*.log"), "'*.log'");
        assert_eq!(quote("$(id)"), "'$(id)'");
        assert_eq!(quote(""), "''");
    }
}
