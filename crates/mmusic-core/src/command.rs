//! Daemon command tokens.
//!
//! Clients steer the daemon by writing whitespace separated tokens into the
//! session pipe. Each token maps to exactly one [`Command`]; anything else
//! is ignored by the daemon.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;


/// Errors that can occur during command parsing.
#[derive( Debug, Error, PartialEq, Eq )]
pub enum CommandError {
    #[error( "Unknown command: {0}" )]
    Unknown( String ),
}


/// A single daemon command.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Hash )]
pub enum Command {
    /// Skip to the next entry (queue first, then library).
    Next,
    /// Rebuild the library from the playlist file.
    Scan,
    Random,
    Normal,
    Pause,
    Resume,
    Increase,
    Decrease,
    Mute,
    /// Shut the daemon down and remove the session directory.
    Exit,
}


impl Command {
    /// Every command, in protocol order.
    pub const ALL: [Command; 10] = [
        Command::Next,
        Command::Scan,
        Command::Random,
        Command::Normal,
        Command::Pause,
        Command::Resume,
        Command::Increase,
        Command::Decrease,
        Command::Mute,
        Command::Exit,
    ];


    /// Parses one token. Tokens are case sensitive.
    pub fn parse( token: &str ) -> Result<Self, CommandError> {
        match token {
            "next" => Ok( Command::Next ),
            "scan" => Ok( Command::Scan ),
            "random" => Ok( Command::Random ),
            "normal" => Ok( Command::Normal ),
            "pause" => Ok( Command::Pause ),
            "resume" => Ok( Command::Resume ),
            "increase" => Ok( Command::Increase ),
            "decrease" => Ok( Command::Decrease ),
            "mute" => Ok( Command::Mute ),
            "exit" => Ok( Command::Exit ),
            other => Err( CommandError::Unknown( other.to_string() ) ),
        }
    }


    /// The wire token for this command.
    pub fn token( &self ) -> &'static str {
        match self {
            Command::Next => "next",
            Command::Scan => "scan",
            Command::Random => "random",
            Command::Normal => "normal",
            Command::Pause => "pause",
            Command::Resume => "resume",
            Command::Increase => "increase",
            Command::Decrease => "decrease",
            Command::Mute => "mute",
            Command::Exit => "exit",
        }
    }


    /// Returns a brief description of the command for help text.
    pub fn description( &self ) -> &'static str {
        match self {
            Command::Next => "Play the next entry",
            Command::Scan => "Re-read the playlist",
            Command::Random => "Pick entries at random",
            Command::Normal => "Play entries in order",
            Command::Pause => "Pause playback",
            Command::Resume => "Resume playback",
            Command::Increase => "Raise the volume by 1%",
            Command::Decrease => "Lower the volume by 1%",
            Command::Mute => "Set the volume to 0",
            Command::Exit => "Stop the daemon",
        }
    }
}


impl FromStr for Command {
    type Err = CommandError;

    fn from_str( s: &str ) -> Result<Self, Self::Err> {
        Command::parse( s )
    }
}


impl fmt::Display for Command {
    fn fmt( &self, f: &mut fmt::Formatter<'_> ) -> fmt::Result {
        f.write_str( self.token() )
    }
}


/// Splits a pipe message into commands, dropping unknown tokens.
pub fn parse_message( message: &str ) -> Vec<Command> {
    message
        .split_whitespace()
        .filter_map( |token| match Command::parse( token ) {
            Ok( cmd ) => Some( cmd ),
            Err( e ) => {
                tracing::debug!( "Ignoring token: {}", e );
                None
            }
        })
        .collect()
}


/// Encodes commands as one pipe message.
pub fn encode_message( commands: &[Command] ) -> String {
    commands.iter().map( Command::token ).collect::<Vec<_>>().join( " " )
}


/// Returns help text listing all commands.
pub fn help_text() -> String {
    let mut help = String::from( "Pipe commands:\n" );
    let lines: Vec<String> = Command::ALL
        .iter()
        .map( |c| format!( "  {:<10} {}", c.token(), c.description() ) )
        .collect();
    help.push_str( &lines.join( "\n" ) );
    help
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_every_token_round_trips() {
        for cmd in Command::ALL {
            assert_eq!( Command::parse( cmd.token() ), Ok( cmd ) );
        }
    }


    #[test]
    fn test_parse_unknown() {
        let result = Command::parse( "foobar" );
        assert!( matches!( result, Err( CommandError::Unknown( _ ) ) ) );
    }


    #[test]
    fn test_parse_is_case_sensitive() {
        assert!( Command::parse( "NEXT" ).is_err() );
    }


    #[test]
    fn test_parse_message_splits_on_any_whitespace() {
        let cmds = parse_message( "next\tpause \n resume\n" );
        assert_eq!( cmds, vec![ Command::Next, Command::Pause, Command::Resume ] );
    }


    #[test]
    fn test_parse_message_drops_unknown_tokens() {
        let cmds = parse_message( "louder next bogus mute" );
        assert_eq!( cmds, vec![ Command::Next, Command::Mute ] );
    }


    #[test]
    fn test_encode_message() {
        assert_eq!( encode_message( &[ Command::Pause, Command::Next ] ), "pause next" );
    }


    #[test]
    fn test_help_lists_everything() {
        let help = help_text();
        for cmd in Command::ALL {
            assert!( help.contains( cmd.token() ) );
        }
    }
}
