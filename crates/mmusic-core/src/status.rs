//! Read side of the published session state, used by clients.

use std::fs;

use crate::paths::SessionPaths;


/// What a client can see of the daemon without asking it.
#[derive( Debug, Clone, Default, PartialEq, Eq )]
pub struct StatusSnapshot {
    pub paused: bool,
    pub random: bool,
    pub playing: Option<String>,
    /// Volume in percent, when the volume file holds a number.
    pub volume: Option<u8>,
}


impl StatusSnapshot {
    /// Reads the session files. Missing or unreadable files show up as
    /// absent values, never as errors: the daemon may be mid-update or gone.
    pub fn read( paths: &SessionPaths ) -> Self {
        let playing = fs::read_to_string( paths.playing() )
            .ok()
            .map( |s| s.trim_end_matches( [ '\n', '\r' ] ).to_string() )
            .filter( |s| !s.is_empty() );

        let volume = fs::read_to_string( paths.volume() )
            .ok()
            .and_then( |s| s.trim().parse::<u8>().ok() );

        Self {
            paused: paths.is_paused().exists(),
            random: paths.is_random().exists(),
            playing,
            volume,
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;

    use std::fs::File;


    #[test]
    fn test_read_published_files() {
        let dir = tempfile::tempdir().unwrap();
        let paths = SessionPaths::new( dir.path() );
        fs::write( paths.playing(), "/music/a.mp3\n" ).unwrap();
        fs::write( paths.volume(), "42\n" ).unwrap();
        File::create( paths.is_random() ).unwrap();

        let status = StatusSnapshot::read( &paths );
        assert_eq!( status, StatusSnapshot {
            paused: false,
            random: true,
            playing: Some( "/music/a.mp3".into() ),
            volume: Some( 42 ),
        });
    }


    #[test]
    fn test_missing_session_is_blank() {
        let dir = tempfile::tempdir().unwrap();
        let paths = SessionPaths::new( dir.path().join( "gone" ) );
        assert_eq!( StatusSnapshot::read( &paths ), StatusSnapshot::default() );
    }
}
