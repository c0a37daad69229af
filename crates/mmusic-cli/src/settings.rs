//! Client settings
//!
//! Read once at startup from `settings.json` in the mmusic config directory.
//! A missing or unreadable file means defaults.

use std::fs;
use std::path::{ Path, PathBuf };
use std::time::Duration;

use serde::{ Deserialize, Serialize };


/// Client settings.
#[derive( Debug, Clone, PartialEq, Eq, Serialize, Deserialize )]
#[serde( default )]
pub struct Settings {
    /// How often the status bar is repainted from the session files.
    pub redraw_interval_ms: u64,

    /// How often the Queue view re-reads the queue while it is shown.
    pub queue_poll_interval_ms: u64,

    /// Directory listed by the Library view.
    pub playlists_dir: Option<PathBuf>,
}


impl Default for Settings {
    fn default() -> Self {
        Self {
            redraw_interval_ms: 250,
            queue_poll_interval_ms: 1000,
            playlists_dir: None,
        }
    }
}


impl Settings {
    /// The mmusic config directory.
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map( |p| p.join( "mmusic" ) )
    }


    /// Loads settings from the config directory, or returns defaults.
    pub fn load() -> Self {
        match Self::config_dir() {
            Some( dir ) => Self::load_from( &dir.join( "settings.json" ) ),
            None => Self::default(),
        }
    }


    pub fn load_from( path: &Path ) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string( path ) {
            Ok( contents ) => serde_json::from_str( &contents ).unwrap_or_else( |e| {
                tracing::warn!( "Ignoring invalid settings {:?}: {}", path, e );
                Self::default()
            }),
            Err( e ) => {
                tracing::warn!( "Failed to read settings: {}", e );
                Self::default()
            }
        }
    }


    pub fn redraw_interval( &self ) -> Duration {
        Duration::from_millis( self.redraw_interval_ms.max( 10 ) )
    }


    pub fn queue_poll_interval( &self ) -> Duration {
        Duration::from_millis( self.queue_poll_interval_ms.max( 10 ) )
    }


    /// Playlists directory: the settings value, else `playlists` in the
    /// config directory.
    pub fn playlists_dir( &self ) -> PathBuf {
        self.playlists_dir
            .clone()
            .or_else( || Self::config_dir().map( |d| d.join( "playlists" ) ) )
            .unwrap_or_else( || PathBuf::from( "." ) )
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!( Settings::load_from( &dir.path().join( "settings.json" ) ), Settings::default() );
    }


    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "settings.json" );
        fs::write( &path, r#"{ "queue_poll_interval_ms": 300, "playlists_dir": "/srv/lists" }"# ).unwrap();

        let settings = Settings::load_from( &path );
        assert_eq!( settings.redraw_interval_ms, 250 );
        assert_eq!( settings.queue_poll_interval(), Duration::from_millis( 300 ) );
        assert_eq!( settings.playlists_dir(), PathBuf::from( "/srv/lists" ) );
    }


    #[test]
    fn test_invalid_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "settings.json" );
        fs::write( &path, "not json" ).unwrap();

        assert_eq!( Settings::load_from( &path ), Settings::default() );
    }
}
