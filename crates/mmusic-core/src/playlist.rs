//! The session library
//!
//! An ordered, immutable list of entries produced by one playlist scan,
//! with the position of the entry that is currently playing.

use rand::Rng;


/// Library of playable entries.
#[derive( Debug, Clone, Default, PartialEq, Eq )]
pub struct Library {
    entries: Vec<String>,
}


impl Library {
    pub fn new( entries: Vec<String> ) -> Self {
        Self { entries }
    }


    /// Gets all entries in order.
    pub fn entries( &self ) -> &[String] {
        &self.entries
    }


    pub fn get( &self, index: usize ) -> Option<&str> {
        self.entries.get( index ).map( String::as_str )
    }


    pub fn len( &self ) -> usize {
        self.entries.len()
    }


    pub fn is_empty( &self ) -> bool {
        self.entries.is_empty()
    }


    /// Index of the first entry equal to `location`.
    pub fn position( &self, location: &str ) -> Option<usize> {
        self.entries.iter().position( |e| e == location )
    }


    /// Index of the first entry, if any.
    pub fn first( &self ) -> Option<usize> {
        if self.entries.is_empty() { None } else { Some( 0 ) }
    }


    /// Index after `index`, wrapping to the first entry after the last.
    pub fn successor( &self, index: usize ) -> Option<usize> {
        if self.entries.is_empty() {
            return None;
        }
        let next = index + 1;
        if next >= self.entries.len() { Some( 0 ) } else { Some( next ) }
    }


    /// Uniformly random index.
    pub fn random<R: Rng + ?Sized>( &self, rng: &mut R ) -> Option<usize> {
        if self.entries.is_empty() {
            None
        } else {
            Some( rng.gen_range( 0..self.entries.len() ) )
        }
    }


    /// Finds where `location` lives after a rescan.
    ///
    /// Matches by exact value; falls back to the first entry when the
    /// location is gone.
    pub fn relocate( &self, location: &str ) -> Option<usize> {
        self.position( location ).or_else( || self.first() )
    }
}


#[cfg( test )]
mod tests {
    use super::*;

    use rand::rngs::StdRng;
    use rand::SeedableRng;


    fn library( names: &[ &str ] ) -> Library {
        Library::new( names.iter().map( |s| s.to_string() ).collect() )
    }


    #[test]
    fn test_successor_wraps() {
        let lib = library( &[ "A", "B", "C" ] );
        assert_eq!( lib.successor( 0 ), Some( 1 ) );
        assert_eq!( lib.successor( 2 ), Some( 0 ) );
    }


    #[test]
    fn test_successor_of_stale_index_wraps() {
        let lib = library( &[ "A", "B" ] );
        assert_eq!( lib.successor( 7 ), Some( 0 ) );
    }


    #[test]
    fn test_empty_library_has_nothing() {
        let lib = Library::default();
        let mut rng = StdRng::seed_from_u64( 1 );
        assert_eq!( lib.first(), None );
        assert_eq!( lib.successor( 0 ), None );
        assert_eq!( lib.random( &mut rng ), None );
        assert_eq!( lib.relocate( "A" ), None );
    }


    #[test]
    fn test_random_stays_in_bounds() {
        let lib = library( &[ "A", "B", "C", "D" ] );
        let mut rng = StdRng::seed_from_u64( 42 );
        for _ in 0..1000 {
            let idx = lib.random( &mut rng ).unwrap();
            assert!( idx < lib.len() );
        }
    }


    #[test]
    fn test_relocate_by_value_or_first() {
        let lib = library( &[ "A", "B", "C" ] );
        assert_eq!( lib.relocate( "C" ), Some( 2 ) );
        assert_eq!( lib.relocate( "gone" ), Some( 0 ) );
    }


    #[test]
    fn test_duplicates_are_kept() {
        let lib = library( &[ "A", "A", "B" ] );
        assert_eq!( lib.len(), 3 );
        assert_eq!( lib.position( "A" ), Some( 0 ) );
    }
}
