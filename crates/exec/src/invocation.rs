use shell_escape::unix::escape;
use smallvec::SmallVec;
use std::{borrow::Cow, fmt};

const SUDO: &str = "sudo";

/// A program and its arguments, kept as discrete values until the moment
/// they are rendered. Rendering to a command line escapes every element,
/// so caller-supplied values can never break out of their argument.
#[derive(Clone, PartialEq, Eq)]
pub struct Invocation {
  sudo: bool,
  program: String,
  args: SmallVec<[String; 6]>,
}

impl Invocation {
  pub fn new(program: impl Into<String>) -> Self {
    Invocation {
      sudo: false,
      program: program.into(),
      args: SmallVec::new(),
    }
  }

  pub fn arg(mut self, arg: impl Into<String>) -> Self {
    self.args.push(arg.into());
    self
  }

  pub fn args<I>(mut self, args: I) -> Self
  where
    I: IntoIterator,
    I::Item: Into<String>,
  {
    self.args.extend(args.into_iter().map(Into::into));
    self
  }

  /// Appends `-name=value` as a single argument.
  pub fn flag(self, name: &str, value: impl fmt::Display) -> Self {
    self.arg(format!("-{}={}", name, value))
  }

  /// Runs the program through `sudo` when `enabled`.
  pub fn sudo(mut self, enabled: bool) -> Self {
    self.sudo = enabled;
    self
  }

  #[inline]
  pub fn program(&self) -> &str {
    &self.program
  }

  #[inline]
  pub fn arguments(&self) -> &[String] {
    &self.args
  }

  /// The full argument vector, starting with `sudo` when enabled.
  pub fn argv(&self) -> impl Iterator<Item = &str> {
    let prefix = if self.sudo { Some(SUDO) } else { None };
    prefix
      .into_iter()
      .chain(Some(self.program.as_str()))
      .chain(self.args.iter().map(String::as_str))
  }

  /// The argument vector rendered as one shell command line.
  pub fn command_line(&self) -> String {
    self
      .argv()
      .map(|a| escape(Cow::Borrowed(a)))
      .collect::<Vec<_>>()
      .join(" ")
  }
}

impl fmt::Display for Invocation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.command_line())
  }
}

impl fmt::Debug for Invocation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("Invocation")
      .field(&self.command_line())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use test_case::test_case;

  #[test]
  fn plain_arguments_are_untouched() {
    let inv = Invocation::new("libvirt-storage-attach")
      .flag("operation", "delete")
      .flag("pv-id", "pv-1234");

    assert_eq!(
      inv.command_line(),
      "libvirt-storage-attach -operation=delete -pv-id=pv-1234"
    );
  }

  #[test_case("pv-1; reboot" => "tool '-pv-id=pv-1; reboot'"; "command separator")]
  #[test_case("$(id)" => "tool '-pv-id=$(id)'"; "substitution")]
  #[test_case("a b" => "tool '-pv-id=a b'"; "whitespace")]
  fn hostile_values_stay_one_argument(value: &str) -> String {
    Invocation::new("tool").flag("pv-id", value).command_line()
  }

  #[test]
  fn sudo_prefix() {
    let inv = Invocation::new("tool").arg("x").sudo(true);

    assert_eq!(inv.argv().collect::<Vec<_>>(), vec!["sudo", "tool", "x"]);
    assert_eq!(inv.command_line(), "sudo tool x");
    assert_eq!(inv.program(), "tool");
  }
}
