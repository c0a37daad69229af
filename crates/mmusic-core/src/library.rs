//! Playlist expansion
//!
//! Turns the lines of a playlist source file into the ordered, flattened
//! list of playable entries: directories are replaced by their children and
//! excluded subtrees are dropped before they are ever opened.

use std::fs;
use std::io;
use std::path::{ Path, PathBuf };

use thiserror::Error;


/// Lines starting with this character are exclusion markers.
pub const EXCLUDE_MARKER: char = '!';


/// Errors that can occur while expanding a playlist.
#[derive( Debug, Error )]
pub enum ExpandError {
    #[error( "Failed to read playlist {path}: {source}" )]
    Source { path: PathBuf, source: io::Error },
}


/// Markers for locations that must not appear in the library.
///
/// A location is excluded when it starts with any marker, so excluding a
/// directory excludes everything beneath it.
#[derive( Debug, Clone, Default, PartialEq, Eq )]
pub struct ExclusionSet {
    markers: Vec<String>,
}


impl ExclusionSet {
    pub fn new() -> Self {
        Self::default()
    }


    /// Adds a marker. Empty markers are ignored since they would match
    /// every location.
    pub fn insert( &mut self, marker: impl Into<String> ) {
        let marker = marker.into();
        if !marker.is_empty() && !self.markers.contains( &marker ) {
            self.markers.push( marker );
        }
    }


    pub fn is_excluded( &self, location: &str ) -> bool {
        self.markers.iter().any( |m| location.starts_with( m.as_str() ) )
    }


    pub fn len( &self ) -> usize {
        self.markers.len()
    }


    pub fn is_empty( &self ) -> bool {
        self.markers.is_empty()
    }
}


/// Raw content of a playlist source: candidates in file order plus the
/// exclusion markers found alongside them.
#[derive( Debug, Clone, Default, PartialEq, Eq )]
pub struct PlaylistSource {
    pub candidates: Vec<String>,
    pub exclusions: ExclusionSet,
}


impl PlaylistSource {
    /// Splits playlist text into candidates and exclusion markers.
    /// Blank lines are skipped.
    pub fn parse( text: &str ) -> Self {
        let mut source = Self::default();

        for line in text.lines() {
            let line = line.trim_end_matches( '\r' );
            if line.trim().is_empty() {
                continue;
            }

            match line.strip_prefix( EXCLUDE_MARKER ) {
                Some( marker ) => source.exclusions.insert( marker ),
                None => source.candidates.push( line.to_string() ),
            }
        }

        source
    }


    /// Expands the candidates into the final list of entries.
    pub fn expand( self ) -> Vec<String> {
        let mut entries = Vec::with_capacity( self.candidates.len() );
        for candidate in self.candidates {
            expand_into( candidate, &self.exclusions, &mut entries );
        }
        entries
    }
}


/// Reads a playlist file and expands it into library entries.
///
/// An unreadable source is an error; unreadable directories found while
/// expanding are skipped.
pub fn expand_file( path: &Path ) -> Result<Vec<String>, ExpandError> {
    let text = fs::read_to_string( path )
        .map_err( |source| ExpandError::Source { path: path.to_path_buf(), source } )?;

    let source = PlaylistSource::parse( &text );
    tracing::debug!(
        "Expanding {:?}: {} candidates, {} exclusions",
        path,
        source.candidates.len(),
        source.exclusions.len()
    );

    let entries = source.expand();
    tracing::info!( "Expanded {:?} into {} entries", path, entries.len() );
    Ok( entries )
}


fn expand_into( candidate: String, exclusions: &ExclusionSet, entries: &mut Vec<String> ) {
    if exclusions.is_excluded( &candidate ) {
        tracing::debug!( "Excluded: {}", candidate );
        return;
    }

    // Anything that is not a readable directory stays as it is; a missing
    // file fails later, at playback.
    let is_dir = fs::metadata( &candidate )
        .map( |m| m.is_dir() )
        .unwrap_or( false );
    if !is_dir {
        entries.push( candidate );
        return;
    }

    let mut children: Vec<String> = match fs::read_dir( &candidate ) {
        Ok( dir ) => dir
            .flatten()
            .map( |e| e.file_name().to_string_lossy().to_string() )
            .collect(),
        Err( e ) => {
            tracing::warn!( "Skipping unreadable directory {}: {}", candidate, e );
            return;
        }
    };
    children.sort();

    let parent = candidate.trim_end_matches( '/' );
    for child in children {
        expand_into( format!( "{}/{}", parent, child ), exclusions, entries );
    }
}


#[cfg( test )]
mod tests {
    use super::*;

    use std::fs::File;


    fn touch( path: &Path ) {
        if let Some( parent ) = path.parent() {
            fs::create_dir_all( parent ).unwrap();
        }
        File::create( path ).unwrap();
    }


    fn expand<S: AsRef<str>>( lines: &[S] ) -> Vec<String> {
        let text = lines.iter().map( |l| l.as_ref() ).collect::<Vec<_>>().join( "\n" );
        PlaylistSource::parse( &text ).expand()
    }


    fn as_str( path: &Path ) -> String {
        path.to_string_lossy().to_string()
    }


    #[test]
    fn test_plain_files_are_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let files: Vec<String> = [ "c.ogg", "a.mp3", "b.flac" ]
            .iter()
            .map( |n| {
                let p = dir.path().join( n );
                touch( &p );
                as_str( &p )
            })
            .collect();

        assert_eq!( expand( &files ), files );
    }


    #[test]
    fn test_missing_entries_and_uris_are_kept() {
        let lines = [ "/no/such/file.mp3", "http://radio.example/stream" ];
        assert_eq!( expand( &lines ), vec![ "/no/such/file.mp3", "http://radio.example/stream" ] );
    }


    #[test]
    fn test_directories_flatten_sorted_at_any_depth() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join( "music" );
        touch( &root.join( "b.mp3" ) );
        touch( &root.join( "a/2.mp3" ) );
        touch( &root.join( "a/1.mp3" ) );
        touch( &root.join( "a/deep/er/still/x.mp3" ) );

        let entries = expand( &[ as_str( &root ) ] );

        let root = as_str( &root );
        assert_eq!( entries, vec![
            format!( "{}/a/1.mp3", root ),
            format!( "{}/a/2.mp3", root ),
            format!( "{}/a/deep/er/still/x.mp3", root ),
            format!( "{}/b.mp3", root ),
        ]);
        assert!( entries.iter().all( |e| !Path::new( e ).is_dir() ) );
    }


    #[test]
    fn test_directory_expands_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join( "first.mp3" );
        let last = dir.path().join( "last.mp3" );
        let album = dir.path().join( "album" );
        touch( &first );
        touch( &last );
        touch( &album.join( "track.mp3" ) );

        let entries = expand( &[ as_str( &first ), as_str( &album ), as_str( &last ) ] );

        assert_eq!( entries, vec![
            as_str( &first ),
            format!( "{}/track.mp3", as_str( &album ) ),
            as_str( &last ),
        ]);
    }


    #[test]
    fn test_excluded_subtree_never_appears() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join( "music" );
        touch( &root.join( "keep/a.mp3" ) );
        touch( &root.join( "skip/b.mp3" ) );
        touch( &root.join( "skip/nested/c.mp3" ) );

        let root = as_str( &root );
        let entries = expand( &[
            root.clone(),
            format!( "!{}/skip", root ),
        ]);

        assert_eq!( entries, vec![ format!( "{}/keep/a.mp3", root ) ] );
    }


    #[test]
    fn test_exclusion_applies_to_top_level_candidates() {
        let lines = [ "/music/one.mp3", "!/music/one", "/music/two.mp3" ];
        assert_eq!( expand( &lines ), vec![ "/music/two.mp3" ] );
    }


    #[test]
    fn test_parse_skips_blank_lines() {
        let source = PlaylistSource::parse( "a\n\n  \n!b\nc\n" );
        assert_eq!( source.candidates, vec![ "a", "c" ] );
        assert!( source.exclusions.is_excluded( "b/x" ) );
    }


    #[test]
    fn test_unreadable_source_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = expand_file( &dir.path().join( "missing" ) );
        assert!( matches!( result, Err( ExpandError::Source { .. } ) ) );
    }


    #[test]
    fn test_expand_file_reads_source() {
        let dir = tempfile::tempdir().unwrap();
        let song = dir.path().join( "song.mp3" );
        touch( &song );
        let source = dir.path().join( "playlist" );
        fs::write( &source, format!( "{}\n", as_str( &song ) ) ).unwrap();

        assert_eq!( expand_file( &source ).unwrap(), vec![ as_str( &song ) ] );
    }
}
