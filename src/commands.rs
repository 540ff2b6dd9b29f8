//! This module defines the `Command` enum and its associated methods for parsing
//! the command line of the recovery tool.

use std::path::PathBuf;

use crate::config::RecoveryConfig;

pub const USAGE: &str = "\
Usage: fat_recov [OPTIONS] <IMAGE>

Recovers BMP files from a FAT32 image and prints `<sha1>  <filename>` for each.

Options:
  -o, --output <DIR>    Write the recovered files into DIR
      --layout          Print the image layout before recovering
      --workers <N>     Number of worker threads (default 4)
      --lookahead <N>   Clusters searched for a file's next fragment (default 100)
      --lenient-bmp     Accept any cluster starting with \"BM\" as a BMP header
      --validate        Run the full FAT32 boot sector validation
  -v                    Increase log verbosity (repeatable)
  -q                    Only log errors
  -h, --help            Print this help";

/// Options of a recovery run.
#[derive(Debug, Clone)]
pub struct RecoverArgs {
    pub image: PathBuf,
    pub output: Option<PathBuf>,
    pub layout: bool,
    /// Number of `-v` flags
    pub verbosity: usize,
    pub quiet: bool,
    pub config: RecoveryConfig,
}

/// Represents a command line of the recovery tool.
#[derive(Debug)]
pub enum Command {
    /// Recover the BMP files of an image.
    Recover(RecoverArgs),
    /// Print the usage.
    Help,
    /// Command line that cannot be run, encapsulating an error message as a `String`.
    Invalid(String),
}

impl Command {
    /// Parses the arguments following the program name.
    ///
    /// # Returns
    /// - `Command::Help` if `-h` or `--help` is present.
    /// - `Command::Recover` when exactly one image path is given and every option is valid.
    /// - `Command::Invalid` with a message otherwise.
    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|s| s.as_ref().to_string()).collect();
        let mut image = None;
        let mut parsed = RecoverArgs {
            image: PathBuf::new(),
            output: None,
            layout: false,
            verbosity: 0,
            quiet: false,
            config: RecoveryConfig::default(),
        };

        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "-h" | "--help" => return Command::Help,
                "-o" | "--output" => match iter.next() {
                    Some(dir) => parsed.output = Some(PathBuf::from(dir)),
                    None => {
                        return Command::Invalid(String::from(
                            "Missing arg: '--output' expects a directory.",
                        ));
                    }
                },
                "--layout" => parsed.layout = true,
                "--workers" => match parse_number::<usize>("--workers", iter.next()) {
                    Ok(0) => {
                        return Command::Invalid(String::from(
                            "Arg parsing error: '--workers' expects at least 1.",
                        ));
                    }
                    Ok(n) => parsed.config.workers = n,
                    Err(msg) => return Command::Invalid(msg),
                },
                "--lookahead" => match parse_number::<u32>("--lookahead", iter.next()) {
                    Ok(n) => parsed.config.lookahead = n,
                    Err(msg) => return Command::Invalid(msg),
                },
                "--lenient-bmp" => parsed.config.strict_bmp_header = false,
                "--validate" => parsed.config.validate = true,
                "-q" => parsed.quiet = true,
                flag if flag.len() > 1 && flag.starts_with('-') && flag[1..].chars().all(|c| c == 'v') => {
                    parsed.verbosity += flag.len() - 1
                }
                other if other.starts_with('-') => {
                    return Command::Invalid(format!("Unknown option: {other:?}"));
                }
                path => {
                    if image.is_some() {
                        return Command::Invalid(format!("Unexpected argument: {path:?}"));
                    }
                    image = Some(PathBuf::from(path));
                }
            }
        }

        match image {
            Some(image) => {
                parsed.image = image;
                Command::Recover(parsed)
            }
            None => Command::Invalid(String::from("Missing arg: the path to a FAT32 image.")),
        }
    }
}

fn parse_number<T: std::str::FromStr>(flag: &str, value: Option<&String>) -> Result<T, String> {
    match value {
        Some(value) => value
            .parse::<T>()
            .map_err(|_| format!("Arg parsing error: '{flag}' expects an unsigned integer.")),
        None => Err(format!("Missing arg: '{flag}' expects a number.")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recover(args: &[&str]) -> RecoverArgs {
        match Command::from_args(args) {
            Command::Recover(args) => args,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn defaults() {
        let args = recover(&["fs.img"]);
        assert_eq!(args.image, PathBuf::from("fs.img"));
        assert!(args.output.is_none());
        assert_eq!(args.config.workers, 4);
        assert_eq!(args.config.lookahead, 100);
        assert!(args.config.strict_bmp_header);
        assert!(!args.config.validate);
    }

    #[test]
    fn options() {
        let args = recover(&[
            "-vv", "--workers", "8", "--lookahead", "20", "--lenient-bmp", "--validate", "-o",
            "out", "--layout", "fs.img",
        ]);
        assert_eq!(args.verbosity, 2);
        assert_eq!(args.config.workers, 8);
        assert_eq!(args.config.lookahead, 20);
        assert!(!args.config.strict_bmp_header);
        assert!(args.config.validate);
        assert!(args.layout);
        assert_eq!(args.output, Some(PathBuf::from("out")));
    }

    #[test]
    fn errors() {
        assert!(matches!(Command::from_args(["--help"]), Command::Help));
        assert!(matches!(Command::from_args::<[&str; 0], &str>([]), Command::Invalid(_)));
        assert!(matches!(Command::from_args(["--workers", "x", "a"]), Command::Invalid(_)));
        assert!(matches!(Command::from_args(["--workers", "0", "a"]), Command::Invalid(_)));
        assert!(matches!(Command::from_args(["a", "b"]), Command::Invalid(_)));
        assert!(matches!(Command::from_args(["--bogus", "a"]), Command::Invalid(_)));
        assert!(matches!(Command::from_args(["a", "--output"]), Command::Invalid(_)));
    }
}
