//! Session directory layout.
//!
//! Every file the daemon and its clients share lives under one session
//! directory. This module names those files and performs the one-time setup
//! and teardown of the directory.

use std::fs::{ self, DirBuilder, File };
use std::io;
use std::os::unix::fs::DirBuilderExt;
use std::path::{ Path, PathBuf };

use nix::sys::stat::Mode;
use thiserror::Error;


pub const SUFFIX_IN: &str = "in";
pub const SUFFIX_PLAYLIST: &str = "playlist";
pub const SUFFIX_UPCOMING: &str = "upcoming";
pub const SUFFIX_PLAYING: &str = "playing";
pub const SUFFIX_VOLUME: &str = "volume";
pub const SUFFIX_IS_PAUSED: &str = "ispaused";
pub const SUFFIX_IS_RANDOM: &str = "israndom";


/// Errors that can occur while creating a session directory.
#[derive( Debug, Error )]
pub enum SessionDirError {
    #[error( "Session directory {0} already exists. Is mmusicd already running?" )]
    AlreadyExists( PathBuf ),

    #[error( "Failed to create named pipe {path}: {source}" )]
    Fifo { path: PathBuf, source: nix::Error },

    #[error( "IO error: {0}" )]
    Io( #[from] io::Error ),
}


/// Paths of every file in a session directory.
#[derive( Debug, Clone, PartialEq, Eq )]
pub struct SessionPaths {
    root: PathBuf,
}


impl SessionPaths {
    pub fn new( root: impl Into<PathBuf> ) -> Self {
        Self { root: root.into() }
    }


    /// Default session root: `$TMPDIR/mmusic-<uid>`.
    pub fn default_root() -> PathBuf {
        let uid = nix::unistd::Uid::current().as_raw();
        std::env::temp_dir().join( format!( "mmusic-{}", uid ) )
    }


    pub fn root( &self ) -> &Path {
        &self.root
    }

    pub fn pipe( &self ) -> PathBuf {
        self.root.join( SUFFIX_IN )
    }

    pub fn playlist( &self ) -> PathBuf {
        self.root.join( SUFFIX_PLAYLIST )
    }

    pub fn upcoming( &self ) -> PathBuf {
        self.root.join( SUFFIX_UPCOMING )
    }

    pub fn playing( &self ) -> PathBuf {
        self.root.join( SUFFIX_PLAYING )
    }

    pub fn volume( &self ) -> PathBuf {
        self.root.join( SUFFIX_VOLUME )
    }

    pub fn is_paused( &self ) -> PathBuf {
        self.root.join( SUFFIX_IS_PAUSED )
    }

    pub fn is_random( &self ) -> PathBuf {
        self.root.join( SUFFIX_IS_RANDOM )
    }


    /// Returns true if the session directory exists.
    pub fn exists( &self ) -> bool {
        self.root.exists()
    }


    /// Creates the session directory with its pipe and seed files.
    ///
    /// Fails with [`SessionDirError::AlreadyExists`] if the directory is
    /// already there, which is how a second daemon instance is detected.
    pub fn create( &self ) -> Result<(), SessionDirError> {
        if self.root.exists() {
            return Err( SessionDirError::AlreadyExists( self.root.clone() ) );
        }

        DirBuilder::new()
            .recursive( true )
            .mode( 0o700 )
            .create( &self.root )?;

        let pipe = self.pipe();
        nix::unistd::mkfifo( &pipe, Mode::S_IRWXU )
            .map_err( |source| SessionDirError::Fifo { path: pipe.clone(), source } )?;

        File::create( self.upcoming() )?;
        File::create( self.playing() )?;
        File::create( self.volume() )?;
        File::create( self.playlist() )?;

        tracing::info!( "Created session directory {:?}", self.root );
        Ok(())
    }


    /// Removes the whole session directory tree.
    pub fn remove( &self ) -> io::Result<()> {
        match fs::remove_dir_all( &self.root ) {
            Ok(()) => Ok(()),
            Err( e ) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err( e ) => Err( e ),
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;

    use std::os::unix::fs::FileTypeExt;


    #[test]
    fn test_create_populates_session() {
        let dir = tempfile::tempdir().unwrap();
        let paths = SessionPaths::new( dir.path().join( "session" ) );

        paths.create().unwrap();

        assert!( fs::metadata( paths.pipe() ).unwrap().file_type().is_fifo() );
        assert!( paths.upcoming().is_file() );
        assert!( paths.playing().is_file() );
        assert!( paths.volume().is_file() );
        assert!( !paths.is_paused().exists() );
    }


    #[test]
    fn test_create_refuses_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let paths = SessionPaths::new( dir.path() );

        let result = paths.create();
        assert!( matches!( result, Err( SessionDirError::AlreadyExists( _ ) ) ) );
    }


    #[test]
    fn test_remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let paths = SessionPaths::new( dir.path().join( "session" ) );

        paths.create().unwrap();
        paths.remove().unwrap();
        assert!( !paths.exists() );
        paths.remove().unwrap();
    }
}
