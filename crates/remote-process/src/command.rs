//! Command lines for the remote shell
//!
//! [`CommandLine`] collects arguments and renders them for a Windows `cmd`
//! shell. Arguments marked sensitive (passwords, tokens) are masked in the
//! obfuscated rendering used for logs, thread names and error messages.
//! [`CommandInvocation`] is the immutable pair of real and obfuscated text the
//! bridge carries around once a process is started.

use std::fmt;

const OBFUSCATED: &str = "********";

/// Characters that force an argument to be quoted
const SPECIAL_CHARS: &[char] = &['&', '|', '<', '>', '^', '(', ')', '"'];

/// A single argument of a command line
#[derive(Clone, PartialEq, Eq)]
pub struct CommandArgument {
    value: String,
    sensitive: bool,
}

impl CommandArgument {
    /// A plain argument
    pub fn plain(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            sensitive: false,
        }
    }

    /// An argument that must never show up in logs
    pub fn sensitive(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            sensitive: true,
        }
    }

    /// The raw value
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Whether the value is masked when obfuscating
    pub fn is_sensitive(&self) -> bool {
        self.sensitive
    }

    fn render(&self, obfuscate: bool) -> String {
        if obfuscate && self.sensitive {
            return OBFUSCATED.to_string();
        }
        quote(&self.value)
    }
}

impl fmt::Debug for CommandArgument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CommandArgument")
            .field(&self.render(true))
            .finish()
    }
}

fn quote(value: &str) -> String {
    if value.is_empty() {
        return "\"\"".to_string();
    }
    if !value.contains(|c: char| c.is_whitespace() || SPECIAL_CHARS.contains(&c)) {
        return value.to_string();
    }
    format!("\"{}\"", value.replace('"', "\\\""))
}

/// A command to be executed in the remote shell
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandLine {
    args: Vec<CommandArgument>,
}

impl CommandLine {
    /// Create an empty command line
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a command line out of plain arguments
    pub fn build<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut line = Self::new();
        for arg in args {
            line.arg(arg);
        }
        line
    }

    /// Add a plain argument
    pub fn arg(&mut self, arg: impl Into<String>) -> &mut Self {
        self.args.push(CommandArgument::plain(arg));
        self
    }

    /// Add an argument that is masked in obfuscated renderings
    pub fn sensitive_arg(&mut self, arg: impl Into<String>) -> &mut Self {
        self.args.push(CommandArgument::sensitive(arg));
        self
    }

    /// Get the arguments
    pub fn args(&self) -> &[CommandArgument] {
        &self.args
    }

    /// Whether no arguments were added
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Render for the remote shell, masking sensitive arguments if `obfuscate`
    pub fn to_command_line(&self, obfuscate: bool) -> String {
        self.args
            .iter()
            .map(|arg| arg.render(obfuscate))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_command_line(true))
    }
}

/// The final text of a started command
#[derive(Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    command: String,
    obfuscated: String,
}

impl CommandInvocation {
    /// Render `line`, prefixing a change of directory when one is given
    pub fn new(line: &CommandLine, working_directory: Option<&str>) -> Self {
        Self::with_prefix(
            line.to_command_line(false),
            line.to_command_line(true),
            working_directory,
        )
    }

    /// Use an already rendered command string as-is
    pub fn raw(command: impl Into<String>, working_directory: Option<&str>) -> Self {
        let command = command.into();
        Self::with_prefix(command.clone(), command, working_directory)
    }

    fn with_prefix(command: String, obfuscated: String, working_directory: Option<&str>) -> Self {
        match working_directory {
            Some(dir) => {
                let prefix = format!("CD /D {} & ", dir);
                Self {
                    command: format!("{}{}", prefix, command),
                    obfuscated: format!("{}{}", prefix, obfuscated),
                }
            }
            None => Self {
                command,
                obfuscated,
            },
        }
    }

    /// The text submitted to the remote shell
    pub fn command(&self) -> &str {
        &self.command
    }

    /// The text safe to show in logs and errors
    pub fn obfuscated(&self) -> &str {
        &self.obfuscated
    }
}

impl fmt::Debug for CommandInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandInvocation")
            .field("command", &self.obfuscated)
            .finish()
    }
}

impl fmt::Display for CommandInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.obfuscated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_arguments() {
        let line = CommandLine::build(["ipconfig", "/all"]);
        assert_eq!(line.to_command_line(false), "ipconfig /all");
        assert_eq!(line.args().len(), 2);
    }

    #[test]
    fn test_quoting() {
        let line = CommandLine::build(["type", "C:\\Program Files\\app.log", "", "a&b", "say \"hi\""]);
        assert_eq!(
            line.to_command_line(false),
            "type \"C:\\Program Files\\app.log\" \"\" \"a&b\" \"say \\\"hi\\\"\""
        );
    }

    #[test]
    fn test_sensitive_arguments_are_obfuscated() {
        let mut line = CommandLine::new();
        line.arg("net").arg("use").arg("Z:").sensitive_arg("s3cret");

        assert_eq!(line.to_command_line(false), "net use Z: s3cret");
        assert_eq!(line.to_command_line(true), "net use Z: ********");
        assert_eq!(line.to_string(), "net use Z: ********");
        assert!(!format!("{:?}", line).contains("s3cret"));
    }

    #[test]
    fn test_invocation_with_working_directory() {
        let mut line = CommandLine::new();
        line.arg("dir").sensitive_arg("hidden");

        let invocation = CommandInvocation::new(&line, Some("C:\\Temp"));
        assert_eq!(invocation.command(), "CD /D C:\\Temp & dir hidden");
        assert_eq!(invocation.obfuscated(), "CD /D C:\\Temp & dir ********");
        assert!(!format!("{:?}", invocation).contains("hidden"));
    }

    #[test]
    fn test_raw_invocation() {
        let invocation = CommandInvocation::raw("echo hello", None);
        assert_eq!(invocation.command(), "echo hello");
        assert_eq!(invocation.obfuscated(), "echo hello");
    }
}
