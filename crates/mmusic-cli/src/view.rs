//! Cursor based list views for the TUI.
//!
//! A view is a list of entries plus a cursor and the cursor's row inside
//! the visible window (`from_top`). All movement is clamped to the ends of
//! the list; nothing wraps around.


/// The three views of the client.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default )]
pub enum ViewKind {
    /// Available playlist files.
    Library,

    /// The daemon's library, as expanded from its playlist.
    #[default]
    Playlist,

    /// Live mirror of the upcoming queue.
    Queue,
}


impl ViewKind {
    pub fn title( &self ) -> &'static str {
        match self {
            ViewKind::Library => "Library",
            ViewKind::Playlist => "Playlist",
            ViewKind::Queue => "Queue",
        }
    }
}


/// One scrollable list.
#[derive( Debug, Clone, Default, PartialEq, Eq )]
pub struct ListView {
    entries: Vec<String>,
    cursor: usize,
    from_top: usize,
}


impl ListView {
    pub fn new( entries: Vec<String> ) -> Self {
        Self { entries, cursor: 0, from_top: 0 }
    }


    pub fn entries( &self ) -> &[String] {
        &self.entries
    }


    pub fn cursor( &self ) -> usize {
        self.cursor
    }


    /// Row of the cursor inside the window.
    pub fn from_top( &self ) -> usize {
        self.from_top
    }


    pub fn len( &self ) -> usize {
        self.entries.len()
    }


    pub fn is_empty( &self ) -> bool {
        self.entries.is_empty()
    }


    /// Entry under the cursor.
    pub fn selected( &self ) -> Option<&str> {
        self.entries.get( self.cursor ).map( String::as_str )
    }


    /// Index of the first entry shown in a window of `height` rows, and the
    /// entries in that window.
    pub fn visible( &self, height: usize ) -> ( usize, &[String] ) {
        let start = self.cursor - self.from_top.min( self.cursor );
        let end = ( start + height.max( 1 ) ).min( self.entries.len() );
        ( start, &self.entries[ start.min( end )..end ] )
    }


    fn last_index( &self ) -> usize {
        self.entries.len().saturating_sub( 1 )
    }


    fn clamp_window( &mut self, height: usize ) {
        self.from_top = self.from_top.min( self.cursor ).min( height.max( 1 ) - 1 );
    }


    /// Keeps the cursor inside a window that may have shrunk.
    pub fn fit( &mut self, height: usize ) {
        self.clamp_window( height );
    }


    pub fn step_forward( &mut self, height: usize ) {
        if self.cursor >= self.last_index() {
            return;
        }
        self.cursor += 1;
        self.from_top += 1;
        if self.from_top >= height.max( 1 ) {
            self.from_top = height / 2;
        }
        self.clamp_window( height );
    }


    pub fn step_back( &mut self, height: usize ) {
        if self.cursor == 0 {
            return;
        }
        self.cursor -= 1;
        if self.from_top == 0 {
            self.from_top = height / 2;
        } else {
            self.from_top -= 1;
        }
        self.clamp_window( height );
    }


    pub fn first( &mut self ) {
        self.cursor = 0;
        self.from_top = 0;
    }


    pub fn last( &mut self, height: usize ) {
        self.cursor = self.last_index();
        self.from_top = height.saturating_sub( 1 );
        self.clamp_window( height );
    }


    /// Moves one window height forward. Stops at the last entry and
    /// recenters when the list runs out first.
    pub fn page_forward( &mut self, height: usize ) {
        let page = height.max( 1 );
        if self.cursor + page <= self.last_index() {
            self.cursor += page;
        } else {
            self.cursor = self.last_index();
            self.from_top = height / 2;
        }
        self.clamp_window( height );
    }


    /// Moves one window height back. Stops at the first entry and
    /// recenters when the list runs out first.
    pub fn page_back( &mut self, height: usize ) {
        let page = height.max( 1 );
        if self.cursor >= page {
            self.cursor -= page;
        } else {
            self.cursor = 0;
            self.from_top = height / 2;
        }
        self.clamp_window( height );
    }


    /// Puts the cursor on `index` in the middle of the window.
    pub fn center_on( &mut self, index: usize, height: usize ) {
        if index >= self.entries.len() {
            return;
        }
        self.cursor = index;
        self.from_top = height / 2;
        self.clamp_window( height );
    }


    /// Moves the cursor to `index`, keeping the window where it is when the
    /// entry is already visible.
    pub fn jump_to( &mut self, index: usize, height: usize ) {
        if index >= self.entries.len() {
            return;
        }
        let ( start, shown ) = self.visible( height );
        if index >= start && index < start + shown.len() {
            self.cursor = index;
            self.from_top = index - start;
        } else {
            self.center_on( index, height );
        }
    }


    /// Centers the entry that `playing` ends with, on a path component
    /// boundary. Returns false if none matches.
    pub fn locate( &mut self, playing: &str, height: usize ) -> bool {
        let found = self.entries
            .iter()
            .position( |e| is_path_suffix( playing, e ) );

        match found {
            Some( index ) => {
                self.center_on( index, height );
                true
            }
            None => false,
        }
    }


    /// Swaps in a fresh list. The cursor stays on the same value if it is
    /// still there, otherwise it goes back to the first entry.
    pub fn refresh( &mut self, entries: Vec<String>, height: usize ) {
        let keep = self.selected().and_then( |s| entries.iter().position( |e| e == s ) );
        self.entries = entries;

        match keep {
            Some( index ) => {
                self.cursor = index;
                self.clamp_window( height );
            }
            None => self.first(),
        }
    }
}


/// All views plus which one is on screen.
///
/// Each view keeps its own cursor and window while another is active.
#[derive( Debug, Default )]
pub struct Views {
    active: ViewKind,
    library: ListView,
    playlist: ListView,
    queue: ListView,
}


impl Views {
    pub fn active_kind( &self ) -> ViewKind {
        self.active
    }


    pub fn switch( &mut self, kind: ViewKind ) {
        self.active = kind;
    }


    pub fn get( &self, kind: ViewKind ) -> &ListView {
        match kind {
            ViewKind::Library => &self.library,
            ViewKind::Playlist => &self.playlist,
            ViewKind::Queue => &self.queue,
        }
    }


    pub fn get_mut( &mut self, kind: ViewKind ) -> &mut ListView {
        match kind {
            ViewKind::Library => &mut self.library,
            ViewKind::Playlist => &mut self.playlist,
            ViewKind::Queue => &mut self.queue,
        }
    }


    pub fn active( &self ) -> &ListView {
        self.get( self.active )
    }


    pub fn active_mut( &mut self ) -> &mut ListView {
        self.get_mut( self.active )
    }
}


/// True if `suffix` is the whole of `path` or its trailing components.
fn is_path_suffix( path: &str, suffix: &str ) -> bool {
    match path.strip_suffix( suffix ) {
        Some( rest ) => !suffix.is_empty() && ( rest.is_empty() || rest.ends_with( '/' ) || suffix.starts_with( '/' ) ),
        None => false,
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    fn view( n: usize ) -> ListView {
        ListView::new( ( 0..n ).map( |i| format!( "/music/{:02}.ogg", i ) ).collect() )
    }


    fn assert_window_ok( v: &ListView, height: usize ) {
        assert!( v.cursor() < v.len().max( 1 ) );
        assert!( v.from_top() < height.max( 1 ) );
        assert!( v.from_top() <= v.cursor() );
    }


    #[test]
    fn test_step_clamps_at_both_ends() {
        let mut v = view( 3 );
        v.step_back( 10 );
        assert_eq!( v.cursor(), 0 );

        for _ in 0..5 {
            v.step_forward( 10 );
        }
        assert_eq!( v.cursor(), 2 );
        assert_eq!( v.from_top(), 2 );
    }


    #[test]
    fn test_step_forward_recenters_when_leaving_window() {
        let mut v = view( 20 );
        for _ in 0..4 {
            v.step_forward( 5 );
        }
        assert_eq!(( v.cursor(), v.from_top() ), ( 4, 4 ));

        v.step_forward( 5 );
        assert_eq!(( v.cursor(), v.from_top() ), ( 5, 2 ));
        assert_eq!( v.visible( 5 ).0, 3 );
    }


    #[test]
    fn test_step_back_recenters_when_leaving_window() {
        let mut v = view( 20 );
        v.last( 5 );
        assert_eq!(( v.cursor(), v.from_top() ), ( 19, 4 ));

        for _ in 0..4 {
            v.step_back( 5 );
        }
        assert_eq!(( v.cursor(), v.from_top() ), ( 15, 0 ));

        v.step_back( 5 );
        assert_eq!(( v.cursor(), v.from_top() ), ( 14, 2 ));
    }


    #[test]
    fn test_first_and_last() {
        let mut v = view( 3 );
        v.last( 10 );
        assert_eq!(( v.cursor(), v.from_top() ), ( 2, 2 ));
        v.first();
        assert_eq!(( v.cursor(), v.from_top() ), ( 0, 0 ));
    }


    #[test]
    fn test_paging_clamps() {
        let mut v = view( 12 );
        v.page_forward( 5 );
        assert_eq!( v.cursor(), 5 );
        v.page_forward( 5 );
        assert_eq!( v.cursor(), 10 );
        v.page_forward( 5 );
        assert_eq!( v.cursor(), 11 );
        assert_window_ok( &v, 5 );

        v.page_back( 5 );
        assert_eq!( v.cursor(), 6 );
        v.page_back( 5 );
        assert_eq!( v.cursor(), 1 );
        v.page_back( 5 );
        assert_eq!( v.cursor(), 0 );
        assert_window_ok( &v, 5 );
    }


    #[test]
    fn test_navigation_never_leaves_bounds() {
        for height in [ 1, 2, 5, 40 ] {
            let mut v = view( 13 );
            for step in 0..200 {
                match step % 7 {
                    0 => v.step_forward( height ),
                    1 => v.page_forward( height ),
                    2 => v.step_back( height ),
                    3 => v.page_forward( height ),
                    4 => v.page_back( height ),
                    5 => v.last( height ),
                    _ => v.page_back( height ),
                }
                assert_window_ok( &v, height );
            }
        }
    }


    #[test]
    fn test_empty_view_is_inert() {
        let mut v = ListView::default();
        v.step_forward( 5 );
        v.page_forward( 5 );
        v.last( 5 );
        v.page_back( 5 );
        assert_eq!( v.cursor(), 0 );
        assert_eq!( v.selected(), None );
        assert!( v.visible( 5 ).1.is_empty() );
    }


    #[test]
    fn test_locate_needs_component_boundary() {
        let mut v = ListView::new( vec![ "b.ogg".into(), "ab.ogg".into(), "music/ab.ogg".into() ] );
        assert!( v.locate( "/m/music/ab.ogg", 10 ) );
        assert_eq!( v.selected(), Some( "ab.ogg" ) );

        let mut v = ListView::new( vec![ "b.ogg".into(), "c.ogg".into() ] );
        assert!( !v.locate( "/m/ab.ogg", 10 ) );
        assert_eq!( v.cursor(), 0 );
        assert!( v.locate( "b.ogg", 10 ) );
    }


    #[test]
    fn test_locate_matches_suffix_and_centers() {
        let mut v = ListView::new( vec![ "a.ogg".into(), "b.ogg".into(), "c.ogg".into(), "d.ogg".into() ] );
        assert!( v.locate( "/home/me/music/c.ogg", 2 ) );
        assert_eq!(( v.cursor(), v.from_top() ), ( 2, 1 ));

        assert!( !v.locate( "/home/me/music/z.ogg", 2 ) );
        assert_eq!( v.cursor(), 2 );
    }


    #[test]
    fn test_jump_keeps_window_when_visible() {
        let mut v = view( 20 );
        v.jump_to( 3, 10 );
        assert_eq!(( v.cursor(), v.from_top() ), ( 3, 3 ));

        v.jump_to( 15, 10 );
        assert_eq!(( v.cursor(), v.from_top() ), ( 15, 5 ));
    }


    #[test]
    fn test_refresh_preserves_cursor_by_value() {
        let mut v = ListView::new( vec![ "x".into(), "y".into(), "z".into() ] );
        v.step_forward( 10 );
        v.step_forward( 10 );
        assert_eq!( v.selected(), Some( "z" ) );

        v.refresh( vec![ "z".into(), "w".into() ], 10 );
        assert_eq!( v.selected(), Some( "z" ) );
        assert_eq!( v.from_top(), 0 );

        v.refresh( vec![ "q".into(), "r".into() ], 10 );
        assert_eq!( v.selected(), Some( "q" ) );
    }


    #[test]
    fn test_views_keep_independent_state() {
        let mut views = Views::default();
        *views.get_mut( ViewKind::Playlist ) = view( 10 );
        *views.get_mut( ViewKind::Queue ) = view( 10 );

        views.active_mut().step_forward( 5 );
        views.active_mut().step_forward( 5 );
        views.switch( ViewKind::Queue );
        assert_eq!( views.active().cursor(), 0 );

        views.active_mut().last( 5 );
        views.switch( ViewKind::Playlist );
        assert_eq!( views.active().cursor(), 2 );
        assert_eq!( views.get( ViewKind::Queue ).cursor(), 9 );
    }
}
