//! Exit status codes used by the `hk` binary.
//! reference: [SYSEXITS](https://man.freebsd.org/cgi/man.cgi?query=sysexits&sektion=3)

/// value: 1 <br>
/// The command ran, but at least one executed action was unsuccessful.
pub const EX_FAILURE: i32 = 1;

/// value: 64 <br>
/// A selector given on the command line could not be compiled.
pub const EX_USAGE: i32 = 64;

/// value: 66 <br>
/// The configuration file does not exist or cannot be read.
pub const EX_NOINPUT: i32 = 66;

/// value: 70 <br>
/// Internal error not attributable to user input.
pub const EX_SOFTWARE: i32 = 70;

/// value: 78 <br>
/// The configuration file is malformed or refers to undefined profiles.
pub const EX_CONFIG: i32 = 78;
