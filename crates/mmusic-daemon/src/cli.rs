//! Command-line argument parsing for mmusicd.

use std::path::PathBuf;

use clap::{ ArgAction, Parser };


/// mmusicd - plays a playlist and takes commands through a named pipe.
#[derive( Parser, Debug )]
#[command( name = "mmusicd" )]
#[command( version, about, long_about = None )]
#[command( after_help = mmusic_core::command::help_text() )]
pub struct Args {
    /// Session directory. Defaults to $TMPDIR/mmusic-<uid>.
    #[arg( short = 't', long )]
    pub session_dir: Option<PathBuf>,

    /// Pick library entries at random.
    #[arg( short, long, default_value_t = true, action = ArgAction::Set )]
    pub random: bool,

    /// Starting volume in percent.
    #[arg( short, long, default_value_t = 50, value_parser = clap::value_parser!( u8 ).range( 0..=100 ) )]
    pub volume: u8,

    /// Also read playlist lines from standard input.
    #[arg( long )]
    pub stdin: bool,

    /// Write logs to this file instead of standard error.
    #[arg( long )]
    pub log_file: Option<PathBuf>,

    /// Playlist files, concatenated into the session playlist.
    #[arg( trailing_var_arg = true )]
    pub playlists: Vec<PathBuf>,
}


#[cfg( test )]
mod tests {
    use super::*;

    use clap::CommandFactory;


    #[test]
    fn test_defaults() {
        let args = Args::parse_from([ "mmusicd" ]);
        assert!( args.random );
        assert_eq!( args.volume, 50 );
        assert!( args.playlists.is_empty() );
    }


    #[test]
    fn test_flags() {
        let args = Args::parse_from([ "mmusicd", "-r", "false", "-v", "80", "-t", "/tmp/s", "a.m3u", "b.m3u" ]);
        assert!( !args.random );
        assert_eq!( args.volume, 80 );
        assert_eq!( args.session_dir, Some( PathBuf::from( "/tmp/s" ) ) );
        assert_eq!( args.playlists, vec![ PathBuf::from( "a.m3u" ), PathBuf::from( "b.m3u" ) ] );
    }


    #[test]
    fn test_help_lists_pipe_commands() {
        let help = Args::command().render_help().to_string();
        assert!( help.contains( "Pipe commands:" ) );
        for cmd in mmusic_core::Command::ALL {
            assert!( help.contains( cmd.token() ), "missing {}", cmd );
        }
    }


    #[test]
    fn test_volume_out_of_range() {
        assert!( Args::try_parse_from([ "mmusicd", "-v", "101" ]).is_err() );
    }
}
