//! Client application state and key handling.
//!
//! Everything here works on files in the session directory and on commands
//! sent through a [`Remote`]; drawing lives in `main.rs`.

use std::fs;
use std::path::{ Path, PathBuf };
use std::time::{ Duration, Instant };

use crossterm::event::{ KeyCode, KeyModifiers };

use mmusic_core::channel::{ self, ChannelError };
use mmusic_core::queue::write_atomic;
use mmusic_core::{ library, Command, QueueFile, SessionPaths, StatusSnapshot };

use crate::input::{ InputBuffer, InputMode };
use crate::search::{ Direction, Search };
use crate::view::{ ViewKind, Views };


const STATUS_MESSAGE_TTL: Duration = Duration::from_secs( 3 );


/// Where commands for the daemon go.
pub trait Remote: Send {
    fn send( &self, commands: &[Command] ) -> Result<(), ChannelError>;
}


/// Sends commands through the session pipe.
pub struct PipeRemote {
    pipe: PathBuf,
}


impl PipeRemote {
    pub fn new( pipe: PathBuf ) -> Self {
        Self { pipe }
    }
}


impl Remote for PipeRemote {
    fn send( &self, commands: &[Command] ) -> Result<(), ChannelError> {
        channel::send( &self.pipe, commands )
    }
}


/// Application state.
pub struct App {
    paths: SessionPaths,
    queue: QueueFile,
    playlists_dir: PathBuf,
    remote: Box<dyn Remote>,

    pub views: Views,
    search: Search,

    pub input_mode: InputMode,
    pub input: InputBuffer,

    status_message: Option<String>,
    status_clear_at: Option<Instant>,

    pub should_quit: bool,

    /// Whether a queue poller is running.
    queue_polling: bool,

    /// Rows available to the list, updated on every draw.
    pub page_height: usize,
}


impl App {
    pub fn new( paths: SessionPaths, playlists_dir: PathBuf, remote: Box<dyn Remote> ) -> Self {
        let queue = QueueFile::new( paths.upcoming() );
        let mut app = Self {
            paths,
            queue,
            playlists_dir,
            remote,
            views: Views::default(),
            search: Search::default(),
            input_mode: InputMode::Normal,
            input: InputBuffer::new(),
            status_message: None,
            status_clear_at: None,
            should_quit: false,
            queue_polling: false,
            page_height: 20,
        };

        for kind in [ ViewKind::Library, ViewKind::Playlist, ViewKind::Queue ] {
            app.refresh( kind );
        }
        app
    }


    pub fn status( &self ) -> StatusSnapshot {
        StatusSnapshot::read( &self.paths )
    }


    pub fn status_message( &self ) -> Option<&str> {
        self.status_message.as_deref()
    }


    /// Sets a transient status message.
    fn set_status( &mut self, msg: impl Into<String> ) {
        self.status_message = Some( msg.into() );
        self.status_clear_at = Some( Instant::now() + STATUS_MESSAGE_TTL );
    }


    /// Clears an expired status message.
    pub fn tick( &mut self ) {
        if let Some( clear_at ) = self.status_clear_at {
            if Instant::now() >= clear_at {
                self.status_message = None;
                self.status_clear_at = None;
            }
        }
    }


    /// Re-reads the entries behind a view, keeping its cursor on the same
    /// value where possible.
    pub fn refresh( &mut self, kind: ViewKind ) {
        let entries = match kind {
            ViewKind::Library => list_playlists( &self.playlists_dir ),
            ViewKind::Playlist => library::expand_file( &self.paths.playlist() ).map_err( |e| e.to_string() ),
            ViewKind::Queue => self.queue.entries().map_err( |e| e.to_string() ),
        };

        let entries = entries.unwrap_or_else( |e| {
            tracing::warn!( "Failed to load {} view: {}", kind.title(), e );
            self.set_status( e );
            Vec::new()
        });

        let height = self.page_height;
        self.views.get_mut( kind ).refresh( entries, height );
    }


    /// Claims the queue poller slot. True means the caller should start a
    /// poller: the Queue view is active and none is running yet.
    pub fn start_queue_poll( &mut self ) -> bool {
        if self.should_quit || self.queue_polling || self.views.active_kind() != ViewKind::Queue {
            return false;
        }
        self.queue_polling = true;
        true
    }


    /// One poller interval. Refreshes the Queue view while it is active and
    /// returns false, releasing the slot, once the poller should stop.
    pub fn queue_poll_tick( &mut self ) -> bool {
        if self.should_quit || self.views.active_kind() != ViewKind::Queue {
            self.queue_polling = false;
            return false;
        }
        self.refresh( ViewKind::Queue );
        true
    }


    fn send( &mut self, commands: &[Command] ) {
        if let Err( e ) = self.remote.send( commands ) {
            tracing::warn!( "{}", e );
            self.set_status( e.to_string() );
        }
    }


    pub fn handle_key( &mut self, code: KeyCode, modifiers: KeyModifiers ) {
        match self.input_mode {
            InputMode::Normal => self.handle_normal_key( code, modifiers ),
            InputMode::Search( direction ) => self.handle_search_key( code, direction ),
        }
    }


    fn handle_normal_key( &mut self, code: KeyCode, modifiers: KeyModifiers ) {
        let height = self.page_height;
        let ctrl = modifiers.contains( KeyModifiers::CONTROL );

        match code {
            KeyCode::Char( 'c' ) if ctrl => self.should_quit = true,
            KeyCode::Char( 'f' ) if ctrl => self.views.active_mut().page_forward( height ),
            KeyCode::Char( 'b' ) if ctrl => self.views.active_mut().page_back( height ),
            KeyCode::Char( 'q' ) => self.should_quit = true,

            KeyCode::Char( 'a' ) => self.queue_selected( false ),
            KeyCode::Char( 'A' ) => self.queue_selected( true ),
            KeyCode::Enter => self.activate_selected(),
            KeyCode::Char( 'l' ) | KeyCode::Right => self.send( &[ Command::Next ] ),
            KeyCode::Char( 'p' ) | KeyCode::Char( ' ' ) => self.toggle_pause(),
            KeyCode::Char( 'r' ) => self.toggle_random(),
            KeyCode::Char( '+' ) => self.send( &[ Command::Increase ] ),
            KeyCode::Char( '-' ) => self.send( &[ Command::Decrease ] ),
            KeyCode::Char( 'm' ) => self.send( &[ Command::Mute ] ),
            KeyCode::Char( 's' ) => {
                self.send( &[ Command::Scan ] );
                self.refresh( ViewKind::Playlist );
            }

            KeyCode::Char( '1' ) => self.switch_view( ViewKind::Library ),
            KeyCode::Char( '2' ) => self.switch_view( ViewKind::Playlist ),
            KeyCode::Char( '3' ) => self.switch_view( ViewKind::Queue ),
            KeyCode::Char( 'c' ) => self.locate_current(),

            KeyCode::Char( '/' ) => self.begin_search( Direction::Forward ),
            KeyCode::Char( '?' ) => self.begin_search( Direction::Backward ),
            KeyCode::Char( 'n' ) => {
                self.search.repeat( self.views.active_mut(), height );
            }
            KeyCode::Char( 'N' ) => {
                self.search.repeat_inverse( self.views.active_mut(), height );
            }

            KeyCode::Char( 'j' ) | KeyCode::Down => self.views.active_mut().step_forward( height ),
            KeyCode::Char( 'k' ) | KeyCode::Up => self.views.active_mut().step_back( height ),
            KeyCode::Char( 'g' ) | KeyCode::Home => self.views.active_mut().first(),
            KeyCode::Char( 'G' ) | KeyCode::End => self.views.active_mut().last( height ),
            KeyCode::PageDown => self.views.active_mut().page_forward( height ),
            KeyCode::PageUp => self.views.active_mut().page_back( height ),
            _ => {}
        }
    }


    fn handle_search_key( &mut self, code: KeyCode, direction: Direction ) {
        match code {
            KeyCode::Enter => {
                self.input_mode = InputMode::Normal;
                self.commit_search( direction );
            }
            KeyCode::Esc => {
                self.input_mode = InputMode::Normal;
                self.input.clear();
            }
            KeyCode::Char( c ) => {
                if !self.input.insert( c ) {
                    self.set_status( "Pattern too long" );
                }
            }
            KeyCode::Backspace => self.input.backspace(),
            KeyCode::Delete => self.input.delete(),
            KeyCode::Left => self.input.move_left(),
            KeyCode::Right => self.input.move_right(),
            KeyCode::Home => self.input.move_home(),
            KeyCode::End => self.input.move_end(),
            _ => {}
        }
    }


    pub fn switch_view( &mut self, kind: ViewKind ) {
        self.views.switch( kind );
        self.refresh( kind );
    }


    fn begin_search( &mut self, direction: Direction ) {
        self.input.clear();
        self.input_mode = InputMode::Search( direction );
    }


    /// Searches with the typed pattern. An empty prompt repeats the last
    /// pattern in the new direction.
    fn commit_search( &mut self, direction: Direction ) {
        let height = self.page_height;
        let pattern = if self.input.is_empty() {
            match self.search.pattern() {
                Some( last ) => last.to_string(),
                None => return,
            }
        } else {
            self.input.take()
        };

        let result = self.search.start( &pattern, direction, self.views.active_mut(), height );

        if let Err( e ) = result {
            tracing::debug!( "Bad search pattern {:?}: {}", pattern, e );
            self.set_status( format!( "Bad pattern: {}", pattern ) );
        }
    }


    /// Queues the entry under the cursor and moves down.
    fn queue_selected( &mut self, front: bool ) {
        if self.views.active_kind() == ViewKind::Library {
            return;
        }
        let Some( location ) = self.views.active().selected().map( str::to_string ) else {
            return;
        };

        let result = if front {
            self.queue.push_front( &location )
        } else {
            self.queue.push_back( &location )
        };

        match result {
            Ok(()) => {
                let height = self.page_height;
                self.views.active_mut().step_forward( height );
                if self.views.active_kind() == ViewKind::Queue {
                    self.refresh( ViewKind::Queue );
                }
            }
            Err( e ) => self.set_status( e.to_string() ),
        }
    }


    /// Enter: plays the entry under the cursor, or in the Library view
    /// makes the selected playlist the daemon's playlist.
    fn activate_selected( &mut self ) {
        let Some( selected ) = self.views.active().selected().map( str::to_string ) else {
            return;
        };

        if self.views.active_kind() == ViewKind::Library {
            self.install_playlist( Path::new( &selected ) );
            return;
        }

        match self.queue.push_front( &selected ) {
            Ok(()) => self.send( &[ Command::Next ] ),
            Err( e ) => self.set_status( e.to_string() ),
        }
    }


    fn install_playlist( &mut self, source: &Path ) {
        let installed = fs::read( source )
            .and_then( |content| write_atomic( &self.paths.playlist(), &content ) );

        match installed {
            Ok(()) => {
                self.send( &[ Command::Scan ] );
                self.refresh( ViewKind::Playlist );
                let name = source.file_name().map( |n| n.to_string_lossy().into_owned() ).unwrap_or_default();
                self.set_status( format!( "Loaded {}", name ) );
            }
            Err( e ) => {
                tracing::warn!( "Failed to install playlist {:?}: {}", source, e );
                self.set_status( format!( "Failed to load playlist: {}", e ) );
            }
        }
    }


    fn toggle_pause( &mut self ) {
        let command = if self.paths.is_paused().exists() { Command::Resume } else { Command::Pause };
        self.send( &[ command ] );
    }


    fn toggle_random( &mut self ) {
        let command = if self.paths.is_random().exists() { Command::Normal } else { Command::Random };
        self.send( &[ command ] );
    }


    fn locate_current( &mut self ) {
        let Some( playing ) = self.status().playing else {
            return;
        };
        let height = self.page_height;
        if !self.views.active_mut().locate( &playing, height ) {
            self.set_status( "Current entry is not in this view" );
        }
    }
}


/// Regular files in the playlists directory, sorted.
fn list_playlists( dir: &Path ) -> Result<Vec<String>, String> {
    let entries = fs::read_dir( dir ).map_err( |e| format!( "Cannot list {:?}: {}", dir, e ) )?;

    let mut files: Vec<String> = entries
        .filter_map( |e| e.ok() )
        .map( |e| e.path() )
        .filter( |p| p.is_file() )
        .map( |p| p.to_string_lossy().into_owned() )
        .collect();
    files.sort();
    Ok( files )
}


#[cfg( test )]
mod tests {
    use super::*;

    use std::sync::{ Arc, Mutex };


    #[derive( Clone, Default )]
    struct RecordingRemote {
        sent: Arc<Mutex<Vec<Command>>>,
    }


    impl Remote for RecordingRemote {
        fn send( &self, commands: &[Command] ) -> Result<(), ChannelError> {
            self.sent.lock().unwrap().extend_from_slice( commands );
            Ok(())
        }
    }


    struct Fixture {
        dir: tempfile::TempDir,
        paths: SessionPaths,
        sent: Arc<Mutex<Vec<Command>>>,
        app: App,
    }


    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let paths = SessionPaths::new( dir.path().join( "session" ) );
        paths.create().unwrap();
        fs::write( paths.playlist(), "/m/a.ogg\n/m/b.ogg\n/m/c.ogg\n" ).unwrap();

        let lists = dir.path().join( "lists" );
        fs::create_dir( &lists ).unwrap();
        fs::write( lists.join( "jazz" ), "/j/x.ogg\n/j/y.ogg\n" ).unwrap();
        fs::write( lists.join( "rock" ), "/r/z.ogg\n" ).unwrap();

        let remote = RecordingRemote::default();
        let sent = Arc::clone( &remote.sent );
        let app = App::new( paths.clone(), lists, Box::new( remote ) );

        Fixture { dir, paths, sent, app }
    }


    fn press( app: &mut App, c: char ) {
        app.handle_key( KeyCode::Char( c ), KeyModifiers::NONE );
    }


    fn sent( fx: &Fixture ) -> Vec<Command> {
        fx.sent.lock().unwrap().clone()
    }


    #[test]
    fn test_starts_on_playlist_view() {
        let fx = fixture();
        assert_eq!( fx.app.views.active_kind(), ViewKind::Playlist );
        assert_eq!( fx.app.views.active().len(), 3 );
        assert_eq!( fx.app.views.get( ViewKind::Library ).len(), 2 );
    }


    #[test]
    fn test_queue_poller_follows_queue_view() {
        let mut fx = fixture();
        assert!( !fx.app.start_queue_poll() );

        press( &mut fx.app, '3' );
        assert!( fx.app.start_queue_poll() );
        assert!( !fx.app.start_queue_poll() );

        fs::write( fx.paths.upcoming(), "/m/b.ogg\n" ).unwrap();
        assert!( fx.app.queue_poll_tick() );
        assert_eq!( fx.app.views.active().entries(), &[ "/m/b.ogg" ] );

        press( &mut fx.app, '2' );
        fs::write( fx.paths.upcoming(), "/m/b.ogg\n/m/c.ogg\n" ).unwrap();
        assert!( !fx.app.queue_poll_tick() );
        assert_eq!( fx.app.views.get( ViewKind::Queue ).len(), 1 );

        press( &mut fx.app, '3' );
        assert!( fx.app.start_queue_poll() );
        assert!( fx.app.queue_poll_tick() );
        assert_eq!( fx.app.views.active().len(), 2 );
    }


    #[test]
    fn test_queue_poller_stops_on_quit() {
        let mut fx = fixture();
        press( &mut fx.app, '3' );
        assert!( fx.app.start_queue_poll() );

        press( &mut fx.app, 'q' );
        assert!( !fx.app.queue_poll_tick() );
        assert!( !fx.app.start_queue_poll() );
    }


    #[test]
    fn test_queue_keys() {
        let mut fx = fixture();
        press( &mut fx.app, 'a' );
        press( &mut fx.app, 'A' );

        let queue = QueueFile::new( fx.paths.upcoming() );
        assert_eq!( queue.entries().unwrap(), vec![ "/m/b.ogg", "/m/a.ogg" ] );
        assert_eq!( fx.app.views.active().cursor(), 2 );
        assert!( sent( &fx ).is_empty() );
    }


    #[test]
    fn test_enter_plays_cursor_entry() {
        let mut fx = fixture();
        fs::write( fx.paths.upcoming(), "/m/c.ogg\n" ).unwrap();
        press( &mut fx.app, 'j' );
        fx.app.handle_key( KeyCode::Enter, KeyModifiers::NONE );

        let queue = QueueFile::new( fx.paths.upcoming() );
        assert_eq!( queue.entries().unwrap(), vec![ "/m/b.ogg", "/m/c.ogg" ] );
        assert_eq!( sent( &fx ), vec![ Command::Next ] );
    }


    #[test]
    fn test_toggles_follow_markers() {
        let mut fx = fixture();
        press( &mut fx.app, 'p' );
        press( &mut fx.app, 'r' );

        fs::File::create( fx.paths.is_paused() ).unwrap();
        fs::File::create( fx.paths.is_random() ).unwrap();
        press( &mut fx.app, ' ' );
        press( &mut fx.app, 'r' );

        assert_eq!( sent( &fx ), vec![ Command::Pause, Command::Random, Command::Resume, Command::Normal ] );
    }


    #[test]
    fn test_search_prompt() {
        let mut fx = fixture();
        press( &mut fx.app, '/' );
        assert_eq!( fx.app.input_mode, InputMode::Search( Direction::Forward ) );
        press( &mut fx.app, 'c' );
        press( &mut fx.app, '\\' );
        press( &mut fx.app, '.' );
        fx.app.handle_key( KeyCode::Enter, KeyModifiers::NONE );

        assert_eq!( fx.app.input_mode, InputMode::Normal );
        assert_eq!( fx.app.views.active().selected(), Some( "/m/c.ogg" ) );

        press( &mut fx.app, 'N' );
        assert_eq!( fx.app.views.active().selected(), Some( "/m/c.ogg" ) );
    }


    #[test]
    fn test_escape_cancels_search() {
        let mut fx = fixture();
        press( &mut fx.app, '/' );
        press( &mut fx.app, 'b' );
        fx.app.handle_key( KeyCode::Esc, KeyModifiers::NONE );

        assert_eq!( fx.app.input_mode, InputMode::Normal );
        assert_eq!( fx.app.views.active().cursor(), 0 );
        assert!( fx.app.input.content().is_empty() );
    }


    #[test]
    fn test_library_enter_installs_playlist() {
        let mut fx = fixture();
        press( &mut fx.app, '1' );
        assert_eq!( fx.app.views.active().selected().map( |s| s.ends_with( "jazz" ) ), Some( true ) );

        fx.app.handle_key( KeyCode::Enter, KeyModifiers::NONE );

        assert_eq!( fs::read_to_string( fx.paths.playlist() ).unwrap(), "/j/x.ogg\n/j/y.ogg\n" );
        assert_eq!( sent( &fx ), vec![ Command::Scan ] );
        assert_eq!( fx.app.views.get( ViewKind::Playlist ).entries(), &[ "/j/x.ogg", "/j/y.ogg" ] );
        assert!( fx.dir.path().exists() );
    }


    #[test]
    fn test_locate_current() {
        let mut fx = fixture();
        fs::write( fx.paths.playing(), "/m/c.ogg\n" ).unwrap();
        press( &mut fx.app, 'c' );
        assert_eq!( fx.app.views.active().cursor(), 2 );
    }


    #[test]
    fn test_queue_view_tracks_file() {
        let mut fx = fixture();
        press( &mut fx.app, '3' );
        assert!( fx.app.views.active().is_empty() );

        fs::write( fx.paths.upcoming(), "/q/1\n/q/2\n" ).unwrap();
        fx.app.refresh( ViewKind::Queue );
        press( &mut fx.app, 'j' );
        assert_eq!( fx.app.views.active().selected(), Some( "/q/2" ) );

        fs::write( fx.paths.upcoming(), "/q/0\n/q/2\n/q/3\n" ).unwrap();
        fx.app.refresh( ViewKind::Queue );
        assert_eq!( fx.app.views.active().selected(), Some( "/q/2" ) );
    }


    #[test]
    fn test_quit_keys() {
        let mut fx = fixture();
        fx.app.handle_key( KeyCode::Char( 'c' ), KeyModifiers::CONTROL );
        assert!( fx.app.should_quit );
    }
}
