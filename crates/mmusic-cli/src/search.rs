//! Regular expression search over the active view.

use regex::Regex;

use crate::view::ListView;


/// Direction of a search.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default )]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}


impl Direction {
    pub fn inverse( self ) -> Self {
        match self {
            Direction::Forward => Direction::Backward,
            Direction::Backward => Direction::Forward,
        }
    }


    /// Prompt character shown while typing a pattern.
    pub fn prompt( self ) -> char {
        match self {
            Direction::Forward => '/',
            Direction::Backward => '?',
        }
    }
}


/// The last search pattern and direction. Both outlive the prompt so the
/// search can be repeated.
#[derive( Debug, Default )]
pub struct Search {
    pattern: Option<Regex>,
    direction: Direction,
}


impl Search {
    pub fn pattern( &self ) -> Option<&str> {
        self.pattern.as_ref().map( Regex::as_str )
    }


    pub fn direction( &self ) -> Direction {
        self.direction
    }


    /// Compiles and stores a new pattern, then searches with it. A pattern
    /// that does not compile leaves the previous search in place.
    pub fn start( &mut self, pattern: &str, direction: Direction, view: &mut ListView, height: usize )
        -> Result<bool, regex::Error>
    {
        let regex = Regex::new( pattern )?;
        self.pattern = Some( regex );
        self.direction = direction;
        Ok( self.repeat( view, height ) )
    }


    /// Searches again in the stored direction.
    pub fn repeat( &self, view: &mut ListView, height: usize ) -> bool {
        self.run( self.direction, view, height )
    }


    /// Searches again in the opposite direction. The stored direction is
    /// not changed.
    pub fn repeat_inverse( &self, view: &mut ListView, height: usize ) -> bool {
        self.run( self.direction.inverse(), view, height )
    }


    fn run( &self, direction: Direction, view: &mut ListView, height: usize ) -> bool {
        let Some( ref regex ) = self.pattern else {
            return false;
        };

        let cursor = view.cursor();
        let entries = view.entries();
        let found = match direction {
            Direction::Forward => entries
                .iter()
                .enumerate()
                .skip( cursor + 1 )
                .find( |( _, e )| regex.is_match( e ) )
                .map( |( i, _ )| i ),
            Direction::Backward => entries[ ..cursor.min( entries.len() ) ]
                .iter()
                .rposition( |e| regex.is_match( e ) ),
        };

        match found {
            Some( index ) => {
                view.jump_to( index, height );
                true
            }
            None => false,
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    fn view() -> ListView {
        ListView::new( vec![
            "/jazz/one.ogg".into(),
            "/rock/two.ogg".into(),
            "/jazz/three.ogg".into(),
            "/rock/four.ogg".into(),
        ])
    }


    #[test]
    fn test_forward_then_repeat() {
        let mut v = view();
        let mut search = Search::default();

        assert!( search.start( "rock", Direction::Forward, &mut v, 10 ).unwrap() );
        assert_eq!( v.cursor(), 1 );
        assert!( search.repeat( &mut v, 10 ) );
        assert_eq!( v.cursor(), 3 );
    }


    #[test]
    fn test_no_match_leaves_view_alone() {
        let mut v = view();
        let mut search = Search::default();

        search.start( "rock", Direction::Forward, &mut v, 10 ).unwrap();
        search.repeat( &mut v, 10 );
        let before = v.clone();

        assert!( !search.repeat( &mut v, 10 ) );
        assert_eq!( v, before );
    }


    #[test]
    fn test_repeat_inverse_keeps_direction() {
        let mut v = view();
        v.last( 10 );
        let mut search = Search::default();

        assert!( search.start( "jazz", Direction::Backward, &mut v, 10 ).unwrap() );
        assert_eq!( v.cursor(), 2 );
        assert!( search.repeat( &mut v, 10 ) );
        assert_eq!( v.cursor(), 0 );

        assert!( search.repeat_inverse( &mut v, 10 ) );
        assert_eq!( v.cursor(), 2 );
        assert_eq!( search.direction(), Direction::Backward );
    }


    #[test]
    fn test_bad_pattern_keeps_previous() {
        let mut v = view();
        let mut search = Search::default();
        search.start( "two", Direction::Forward, &mut v, 10 ).unwrap();

        assert!( search.start( "(", Direction::Backward, &mut v, 10 ).is_err() );
        assert_eq!( search.pattern(), Some( "two" ) );
        assert_eq!( search.direction(), Direction::Forward );
    }


    #[test]
    fn test_repeat_without_pattern_does_nothing() {
        let mut v = view();
        assert!( !Search::default().repeat( &mut v, 10 ) );
        assert_eq!( v.cursor(), 0 );
    }
}
