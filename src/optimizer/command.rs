//! # Command Template
//!
//! Argument templates for external optimizers. In-place tools are told
//! where to read and write through two named slots, filled with the file
//! *basenames* at run time (the tool runs inside the source directory).
//! Filter tools read stdin and write stdout, so their template carries no
//! slots at all.
//!
//! Slots are enum variants rather than magic values, so a literal argument
//! can never be mistaken for a placeholder.

use crate::error::{OptimizeError, Result};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

/// A single token of a command template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    /// Passed through unchanged
    Literal(OsString),
    /// Replaced with the basename of the file being optimized
    Input,
    /// Replaced with the basename of the temporary output file
    Output,
}

/// How the tool exchanges image data with the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandMode {
    /// Tool reads and writes named files
    InPlace,
    /// Tool reads stdin and writes stdout
    Filter,
}

/// Program plus ordered argument template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    program: PathBuf,
    args: Vec<Arg>,
}

impl CommandTemplate {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append one literal argument
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(Arg::Literal(arg.into()));
        self
    }

    /// Append several literal arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(|a| Arg::Literal(a.into())));
        self
    }

    /// Append the input-file slot
    pub fn input(mut self) -> Self {
        self.args.push(Arg::Input);
        self
    }

    /// Append the output-file slot
    pub fn output(mut self) -> Self {
        self.args.push(Arg::Output);
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Tool name used in diagnostics, as given to [`CommandTemplate::new`]
    pub fn display_name(&self) -> String {
        self.program.display().to_string()
    }

    pub fn template(&self) -> &[Arg] {
        &self.args
    }

    /// Check that the slots match the mode: exactly one of each for
    /// in-place tools, none for filters
    pub fn validate(&self, mode: CommandMode) -> Result<()> {
        let inputs = self.args.iter().filter(|a| **a == Arg::Input).count();
        let outputs = self.args.iter().filter(|a| **a == Arg::Output).count();

        match mode {
            CommandMode::InPlace if inputs != 1 || outputs != 1 => Err(OptimizeError::Validation(format!(
                "in-place command for {} needs exactly one input and one output slot (found {} and {})",
                self.display_name(),
                inputs,
                outputs
            ))),
            CommandMode::Filter if inputs != 0 || outputs != 0 => Err(OptimizeError::Validation(format!(
                "filter command for {} must not reference input or output files",
                self.display_name()
            ))),
            _ => Ok(()),
        }
    }

    /// Render the argument vector, filling the slots with the given basenames
    pub fn render(&self, input: &OsStr, output: &OsStr) -> Vec<OsString> {
        self.args
            .iter()
            .map(|arg| match arg {
                Arg::Literal(value) => value.clone(),
                Arg::Input => input.to_os_string(),
                Arg::Output => output.to_os_string(),
            })
            .collect()
    }

    /// Render a slot-free template
    pub fn render_filter(&self) -> Vec<OsString> {
        self.render(OsStr::new(""), OsStr::new(""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jpegtran() -> CommandTemplate {
        CommandTemplate::new("jpegtran")
            .args(["-copy", "none", "-optimize", "-outfile"])
            .output()
            .input()
    }

    #[test]
    fn test_render_substitutes_slots() {
        let rendered = jpegtran().render(OsStr::new("in.jpg"), OsStr::new("tmp123.jpg"));
        assert_eq!(
            rendered,
            vec!["-copy", "none", "-optimize", "-outfile", "tmp123.jpg", "in.jpg"]
                .into_iter()
                .map(OsString::from)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_literal_equal_to_basename_is_untouched() {
        let template = CommandTemplate::new("tool").arg("in.jpg").input().output();
        let rendered = template.render(OsStr::new("in.jpg"), OsStr::new("out.jpg"));
        assert_eq!(rendered, vec![OsString::from("in.jpg"), "in.jpg".into(), "out.jpg".into()]);
    }

    #[test]
    fn test_validate_in_place() {
        assert!(jpegtran().validate(CommandMode::InPlace).is_ok());
        assert!(jpegtran().validate(CommandMode::Filter).is_err());

        let missing_output = CommandTemplate::new("tool").input();
        assert!(missing_output.validate(CommandMode::InPlace).is_err());

        let double_input = CommandTemplate::new("tool").input().input().output();
        assert!(double_input.validate(CommandMode::InPlace).is_err());
    }

    #[test]
    fn test_validate_filter() {
        let cjpeg = CommandTemplate::new("cjpeg").args(["-quality", "80"]);
        assert!(cjpeg.validate(CommandMode::Filter).is_ok());
        assert!(cjpeg.validate(CommandMode::InPlace).is_err());
        assert_eq!(cjpeg.render_filter(), vec![OsString::from("-quality"), "80".into()]);
    }
}
