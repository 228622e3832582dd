// src/mode.rs

//! Open-mode strings
//!
//! The front-end accepts modes in the classic `fopen` style: exactly one of
//! `r`/`w`/`a`, an optional `+` for update, and an optional `b`/`t` binary
//! or text selector. The selector is recorded but carries no semantic
//! weight on a byte-level API; everything else maps onto
//! [`std::fs::OpenOptions`] the way those modes map onto `open(2)`.

use std::fs::OpenOptions;
use std::str::FromStr;

use crate::Error;

/// The primary access discipline of an open mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
    Append,
}

/// A parsed open-mode string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenMode {
    access: Access,
    update: bool,
    binary: bool,
}

impl OpenMode {
    /// Plain read mode (`"r"`)
    pub fn read() -> Self {
        Self {
            access: Access::Read,
            update: false,
            binary: false,
        }
    }

    /// Plain write mode (`"w"`)
    pub fn write() -> Self {
        Self {
            access: Access::Write,
            update: false,
            binary: false,
        }
    }

    /// Plain append mode (`"a"`)
    pub fn append() -> Self {
        Self {
            access: Access::Append,
            update: false,
            binary: false,
        }
    }

    pub fn access(&self) -> Access {
        self.access
    }

    pub fn is_binary(&self) -> bool {
        self.binary
    }

    /// Whether a handle opened with this mode can be read from
    pub fn readable(&self) -> bool {
        self.access == Access::Read || self.update
    }

    /// Whether a handle opened with this mode can be written to
    pub fn writable(&self) -> bool {
        self.access != Access::Read || self.update
    }

    /// Whether opening truncates existing contents
    pub fn truncates(&self) -> bool {
        self.access == Access::Write
    }

    /// Whether writes land at the end of the file
    pub fn appends(&self) -> bool {
        self.access == Access::Append
    }

    /// The [`OpenOptions`] equivalent of this mode
    pub fn open_options(&self) -> OpenOptions {
        let mut options = OpenOptions::new();
        match self.access {
            Access::Read => {
                options.read(true);
                if self.update {
                    options.write(true);
                }
            }
            Access::Write => {
                options.write(true).create(true).truncate(true);
                if self.update {
                    options.read(true);
                }
            }
            Access::Append => {
                options.append(true).create(true);
                if self.update {
                    options.read(true);
                }
            }
        }
        options
    }
}

impl Default for OpenMode {
    fn default() -> Self {
        Self::read()
    }
}

impl FromStr for OpenMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        let mut access = None;
        let mut update = false;
        let mut binary = None;

        for c in s.chars() {
            match c {
                'r' | 'w' | 'a' => {
                    if access.is_some() {
                        return Err(Error::InvalidMode(s.to_string()));
                    }
                    access = Some(match c {
                        'r' => Access::Read,
                        'w' => Access::Write,
                        _ => Access::Append,
                    });
                }
                '+' => {
                    if update {
                        return Err(Error::InvalidMode(s.to_string()));
                    }
                    update = true;
                }
                'b' | 't' => {
                    if binary.is_some() {
                        return Err(Error::InvalidMode(s.to_string()));
                    }
                    binary = Some(c == 'b');
                }
                _ => return Err(Error::InvalidMode(s.to_string())),
            }
        }

        let Some(access) = access else {
            return Err(Error::InvalidMode(s.to_string()));
        };

        Ok(Self {
            access,
            update,
            binary: binary.unwrap_or(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_modes() {
        assert_eq!("r".parse::<OpenMode>().unwrap(), OpenMode::read());
        assert_eq!("w".parse::<OpenMode>().unwrap(), OpenMode::write());
        assert_eq!("a".parse::<OpenMode>().unwrap(), OpenMode::append());
    }

    #[test]
    fn test_parse_binary_and_update() {
        let mode: OpenMode = "wb".parse().unwrap();
        assert_eq!(mode.access(), Access::Write);
        assert!(mode.is_binary());
        assert!(!mode.readable());

        let mode: OpenMode = "r+".parse().unwrap();
        assert!(mode.readable());
        assert!(mode.writable());
        assert!(!mode.truncates());

        let mode: OpenMode = "a+b".parse().unwrap();
        assert!(mode.appends());
        assert!(mode.readable());
        assert!(mode.is_binary());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<OpenMode>().is_err());
        assert!("x".parse::<OpenMode>().is_err());
        assert!("rw".parse::<OpenMode>().is_err());
        assert!("r++".parse::<OpenMode>().is_err());
        assert!("rbt".parse::<OpenMode>().is_err());
    }

    #[test]
    fn test_write_truncates_append_does_not() {
        assert!("w".parse::<OpenMode>().unwrap().truncates());
        assert!(!"a".parse::<OpenMode>().unwrap().truncates());
        assert!(!"r+".parse::<OpenMode>().unwrap().truncates());
    }
}
