//! Command-line argument parsing for mmterm.

use std::path::PathBuf;

use clap::Parser;


/// mmterm - terminal client for a running mmusicd.
#[derive( Parser, Debug )]
#[command( name = "mmterm" )]
#[command( version, about, long_about = None )]
pub struct Args {
    /// Session directory. Defaults to $TMPDIR/mmusic-<uid>.
    #[arg( short = 't', long )]
    pub session_dir: Option<PathBuf>,

    /// Directory of playlist files shown in the Library view.
    #[arg( long )]
    pub playlists: Option<PathBuf>,
}
