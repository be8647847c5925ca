use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "dice")]
#[command(about = "Shared dice - one die face, many participants")]
#[command(version)]
pub struct Cli {
    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a multi-participant session against the in-process relay
    Demo {
        /// Number of participants sharing the session
        #[arg(short, long, default_value = "2")]
        participants: u8,

        /// Number of rolls to perform
        #[arg(short, long, default_value = "3")]
        rolls: u32,
    },

    /// Render a die face as its glyph
    Show {
        /// Face value in [1, 6]
        face: u8,
    },

    /// Print the service configuration resolved from the environment
    Config,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_demo_defaults() {
        let cli = Cli::try_parse_from(["dice", "demo"]).unwrap();
        match cli.command {
            Commands::Demo { participants, rolls } => {
                assert_eq!(participants, 2);
                assert_eq!(rolls, 3);
            }
            _ => panic!("expected demo command"),
        }
    }

    #[test]
    fn parse_demo_overrides() {
        let cli = Cli::try_parse_from(["dice", "demo", "-p", "4", "--rolls", "10"]).unwrap();
        match cli.command {
            Commands::Demo { participants, rolls } => {
                assert_eq!(participants, 4);
                assert_eq!(rolls, 10);
            }
            _ => panic!("expected demo command"),
        }
    }

    #[test]
    fn verbose_flag_counts() {
        let cli = Cli::try_parse_from(["dice", "-vv", "config"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn invalid_command_fails() {
        assert!(Cli::try_parse_from(["dice", "unknown"]).is_err());
    }
}
