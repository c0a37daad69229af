//! Builds the session playlist from the files given on the command line.

use std::fs;
use std::io::{ self, Read };
use std::path::{ Path, PathBuf };


/// Concatenates playlist sources, standard input first. Unreadable files
/// are logged and skipped.
pub fn collect<R: Read>( files: &[PathBuf], stdin: Option<R> ) -> io::Result<String> {
    let mut text = String::new();

    if let Some( mut input ) = stdin {
        let mut content = String::new();
        input.read_to_string( &mut content )?;
        append( &mut text, &content );
    }

    for file in files {
        match fs::read_to_string( file ) {
            Ok( content ) => append( &mut text, &content ),
            Err( e ) => tracing::warn!( "Skipping playlist {:?}: {}", file, e ),
        }
    }

    Ok( text )
}


fn append( text: &mut String, content: &str ) {
    text.push_str( content );
    if !content.is_empty() && !content.ends_with( '\n' ) {
        text.push( '\n' );
    }
}


/// Writes the collected playlist into the session.
pub fn install( playlist: &Path, text: &str ) -> io::Result<()> {
    mmusic_core::queue::write_atomic( playlist, text.as_bytes() )
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_concatenates_in_order_and_skips_missing() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join( "a" );
        let b = dir.path().join( "b" );
        fs::write( &a, "/m/one\n/m/two" ).unwrap();
        fs::write( &b, "/m/three\n" ).unwrap();

        let files = vec![ a, dir.path().join( "missing" ), b ];
        let text = collect::<&[u8]>( &files, None ).unwrap();
        assert_eq!( text, "/m/one\n/m/two\n/m/three\n" );
    }


    #[test]
    fn test_stdin_comes_first() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join( "a" );
        fs::write( &a, "/m/one\n" ).unwrap();

        let text = collect( &[ a ], Some( &b"!/m/skip\n/m/two"[..] ) ).unwrap();
        assert_eq!( text, "!/m/skip\n/m/two\n/m/one\n" );
    }
}
