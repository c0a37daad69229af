//! The upcoming queue
//!
//! A plain text file, one location per line, used as a durable FIFO of
//! "play next" requests. It is shared between the daemon, which pops from
//! it, and any number of clients, which push onto it and list it.
//!
//! Every rewrite goes to a temporary file in the same directory which is
//! then renamed over the queue, so a reader always sees either the old or
//! the new content and never a half written file.

use std::fs::{ self, OpenOptions };
use std::io::{ self, Write };
use std::path::{ Path, PathBuf };

use tempfile::NamedTempFile;
use thiserror::Error;


/// Longest queue entry accepted, in bytes (newline excluded). This is a
/// hard limit of the queue file format: pushes reject longer entries and
/// `pop` discards them.
pub const MAX_ENTRY_LEN: usize = 4096;


/// Errors that can occur with queue operations.
#[derive( Debug, Error )]
pub enum QueueError {
    #[error( "IO error on queue {path}: {source}" )]
    Io { path: PathBuf, source: io::Error },

    #[error( "Queue entry is {0} bytes, the limit is {limit}", limit = MAX_ENTRY_LEN )]
    EntryTooLong( usize ),

    #[error( "Queue entry contains a newline" )]
    EmbeddedNewline,

    #[error( "Queue entry is empty" )]
    Empty,
}


/// Handle on a queue file. Holds no data; every operation goes to disk.
#[derive( Debug, Clone, PartialEq, Eq )]
pub struct QueueFile {
    path: PathBuf,
}


impl QueueFile {
    pub fn new( path: impl Into<PathBuf> ) -> Self {
        Self { path: path.into() }
    }


    pub fn path( &self ) -> &Path {
        &self.path
    }


    /// Removes and returns the first entry, or `None` when the queue is
    /// empty. Blank lines and lines over [`MAX_ENTRY_LEN`] ahead of the
    /// first entry are dropped in the same rewrite.
    pub fn pop( &self ) -> Result<Option<String>, QueueError> {
        let content = self.read()?;

        let mut rest = content.as_str();
        let mut popped = None;
        while !rest.is_empty() {
            let ( line, tail ) = rest.split_once( '\n' ).unwrap_or(( rest, "" ));
            rest = tail;

            let line = line.trim_end_matches( '\r' );
            if line.trim().is_empty() {
                continue;
            }
            if line.len() > MAX_ENTRY_LEN {
                tracing::warn!( "Dropping queue entry of {} bytes from {:?}", line.len(), self.path );
                continue;
            }
            popped = Some( line.to_string() );
            break;
        }

        if rest.len() != content.len() {
            self.replace( rest )?;
        }
        Ok( popped )
    }


    /// Appends an entry to the end of the queue.
    pub fn push_back( &self, location: &str ) -> Result<(), QueueError> {
        validate( location )?;

        let mut file = OpenOptions::new()
            .create( true )
            .append( true )
            .open( &self.path )
            .map_err( |e| self.io_error( e ) )?;
        file.write_all( format!( "{}\n", location ).as_bytes() )
            .map_err( |e| self.io_error( e ) )
    }


    /// Inserts an entry ahead of everything already queued.
    pub fn push_front( &self, location: &str ) -> Result<(), QueueError> {
        validate( location )?;

        let content = self.read()?;
        let mut updated = String::with_capacity( location.len() + 1 + content.len() );
        updated.push_str( location );
        updated.push( '\n' );
        updated.push_str( &content );
        self.replace( &updated )
    }


    /// Snapshot of all queued entries in order.
    pub fn entries( &self ) -> Result<Vec<String>, QueueError> {
        Ok( self.read()?
            .lines()
            .map( |l| l.trim_end_matches( '\r' ) )
            .filter( |l| !l.trim().is_empty() )
            .map( str::to_string )
            .collect() )
    }


    pub fn is_empty( &self ) -> Result<bool, QueueError> {
        Ok( self.entries()?.is_empty() )
    }


    fn read( &self ) -> Result<String, QueueError> {
        match fs::read_to_string( &self.path ) {
            Ok( content ) => Ok( content ),
            Err( e ) if e.kind() == io::ErrorKind::NotFound => Ok( String::new() ),
            Err( e ) => Err( self.io_error( e ) ),
        }
    }


    fn replace( &self, content: &str ) -> Result<(), QueueError> {
        write_atomic( &self.path, content.as_bytes() ).map_err( |e| self.io_error( e ) )
    }


    fn io_error( &self, source: io::Error ) -> QueueError {
        QueueError::Io { path: self.path.clone(), source }
    }
}


fn validate( location: &str ) -> Result<(), QueueError> {
    if location.trim().is_empty() {
        return Err( QueueError::Empty );
    }
    if location.contains( '\n' ) {
        return Err( QueueError::EmbeddedNewline );
    }
    if location.len() > MAX_ENTRY_LEN {
        return Err( QueueError::EntryTooLong( location.len() ) );
    }
    Ok(())
}


/// Replaces `path` with `content` by writing a sibling temporary file and
/// renaming it into place.
pub fn write_atomic( path: &Path, content: &[u8] ) -> io::Result<()> {
    let dir = match path.parent() {
        Some( p ) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from( "." ),
    };

    let mut tmp = NamedTempFile::new_in( dir )?;
    tmp.write_all( content )?;
    tmp.as_file().sync_data()?;
    tmp.persist( path ).map_err( |e| e.error )?;
    Ok(())
}


#[cfg( test )]
mod tests {
    use super::*;


    fn queue() -> ( tempfile::TempDir, QueueFile ) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "upcoming" );
        fs::write( &path, "" ).unwrap();
        ( dir, QueueFile::new( path ) )
    }


    fn assert_well_formed( queue: &QueueFile ) {
        let raw = fs::read_to_string( queue.path() ).unwrap();
        assert!( raw.is_empty() || raw.ends_with( '\n' ), "torn queue: {:?}", raw );
    }


    #[test]
    fn test_push_back_then_pop_in_order() {
        let ( _dir, queue ) = queue();
        queue.push_back( "a" ).unwrap();
        queue.push_back( "b" ).unwrap();

        assert_eq!( queue.pop().unwrap().as_deref(), Some( "a" ) );
        assert_eq!( queue.pop().unwrap().as_deref(), Some( "b" ) );
        assert_eq!( queue.pop().unwrap(), None );
    }


    #[test]
    fn test_push_front_goes_ahead() {
        let ( _dir, queue ) = queue();
        queue.push_back( "b" ).unwrap();
        queue.push_back( "c" ).unwrap();
        queue.push_front( "a" ).unwrap();

        assert_eq!( queue.entries().unwrap(), vec![ "a", "b", "c" ] );
    }


    #[test]
    fn test_file_stays_well_formed() {
        enum Op { Back( &'static str ), Front( &'static str ), Pop }

        let ( _dir, queue ) = queue();
        let ops = [
            Op::Back( "/music/one.mp3" ),
            Op::Front( "/music/zero.mp3" ),
            Op::Pop,
            Op::Back( "/music/two.mp3" ),
            Op::Pop,
            Op::Pop,
            Op::Pop,
        ];

        for op in ops {
            match op {
                Op::Back( loc ) => queue.push_back( loc ).unwrap(),
                Op::Front( loc ) => queue.push_front( loc ).unwrap(),
                Op::Pop => { queue.pop().unwrap(); }
            }
            assert_well_formed( &queue );
        }
        assert!( queue.is_empty().unwrap() );
    }


    #[test]
    fn test_pop_skips_leading_blank_lines() {
        let ( _dir, queue ) = queue();
        fs::write( queue.path(), "\n\nx\ny\n" ).unwrap();

        assert_eq!( queue.pop().unwrap().as_deref(), Some( "x" ) );
        assert_eq!( fs::read_to_string( queue.path() ).unwrap(), "y\n" );
    }


    #[test]
    fn test_pop_accepts_missing_final_newline() {
        let ( _dir, queue ) = queue();
        fs::write( queue.path(), "only" ).unwrap();

        assert_eq!( queue.pop().unwrap().as_deref(), Some( "only" ) );
        assert_eq!( queue.pop().unwrap(), None );
    }


    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let queue = QueueFile::new( dir.path().join( "nope" ) );
        assert_eq!( queue.pop().unwrap(), None );
        assert!( queue.entries().unwrap().is_empty() );
    }


    #[test]
    fn test_oversized_entries_are_rejected() {
        let ( _dir, queue ) = queue();
        let long = "x".repeat( MAX_ENTRY_LEN + 1 );
        assert!( matches!( queue.push_back( &long ), Err( QueueError::EntryTooLong( _ ) ) ) );
        assert!( queue.is_empty().unwrap() );
    }


    #[test]
    fn test_pop_drops_oversized_head() {
        let ( _dir, queue ) = queue();
        let long = "x".repeat( MAX_ENTRY_LEN + 3 );
        fs::write( queue.path(), format!( "{}\nshort\nnext\n", long ) ).unwrap();

        assert_eq!( queue.pop().unwrap().as_deref(), Some( "short" ) );
        assert_eq!( fs::read_to_string( queue.path() ).unwrap(), "next\n" );
    }


    #[test]
    fn test_pop_skips_whitespace_lines() {
        let ( _dir, queue ) = queue();
        fs::write( queue.path(), "   \n\t\nx\n" ).unwrap();

        assert_eq!( queue.entries().unwrap(), vec![ "x" ] );
        assert_eq!( queue.pop().unwrap().as_deref(), Some( "x" ) );
        assert_eq!( fs::read_to_string( queue.path() ).unwrap(), "" );
    }


    #[test]
    fn test_pop_clears_queue_of_only_blanks() {
        let ( _dir, queue ) = queue();
        fs::write( queue.path(), "  \n\n" ).unwrap();

        assert_eq!( queue.pop().unwrap(), None );
        assert_eq!( fs::read_to_string( queue.path() ).unwrap(), "" );
    }


    #[test]
    fn test_newlines_are_rejected() {
        let ( _dir, queue ) = queue();
        assert!( matches!( queue.push_front( "a\nb" ), Err( QueueError::EmbeddedNewline ) ) );
        assert!( matches!( queue.push_back( "" ), Err( QueueError::Empty ) ) );
    }
}
