//! Drives a session through its named pipe, the way a client does.

use std::fs;
use std::io::Write;
use std::sync::{ Arc, Mutex };
use std::thread;
use std::time::{ Duration, Instant };

use mmusic_core::channel::{ self, SharedSession };
use mmusic_core::{ Command, NullEngine, PlayMode, Session, SessionOptions, SessionPaths, StatusSnapshot };


fn start_session( dir: &tempfile::TempDir ) -> ( SessionPaths, SharedSession<NullEngine> ) {
    let paths = SessionPaths::new( dir.path().join( "session" ) );
    paths.create().unwrap();
    fs::write( paths.playlist(), "/music/a.ogg\n/music/b.ogg\n" ).unwrap();

    let options = SessionOptions { mode: PlayMode::Sequential, volume: 0.5 };
    let mut session = Session::new( paths.clone(), NullEngine::default(), options ).unwrap();
    session.rescan().unwrap();

    ( paths, Arc::new( Mutex::new( session ) ) )
}


/// Polls the published state until `ready` holds, failing after a few
/// seconds.
fn wait_for( paths: &SessionPaths, ready: impl Fn( &StatusSnapshot ) -> bool ) -> StatusSnapshot {
    let deadline = Instant::now() + Duration::from_secs( 5 );
    loop {
        let status = StatusSnapshot::read( paths );
        if ready( &status ) {
            return status;
        }
        assert!( Instant::now() < deadline, "timed out waiting, last status {:?}", status );
        thread::sleep( Duration::from_millis( 10 ) );
    }
}


#[test]
fn test_commands_over_pipe_update_published_state() {
    let dir = tempfile::tempdir().unwrap();
    let ( paths, session ) = start_session( &dir );

    let listener = {
        let session = Arc::clone( &session );
        let pipe = paths.pipe();
        thread::spawn( move || channel::listen( &pipe, &session ) )
    };

    channel::send( &paths.pipe(), &[ Command::Next, Command::Random, Command::Pause, Command::Increase ] ).unwrap();

    let status = wait_for( &paths, |s| s.paused && s.random && s.volume == Some( 51 ) );
    assert_eq!( status.playing.as_deref(), Some( "/music/a.ogg" ) );

    channel::send( &paths.pipe(), &[ Command::Exit, Command::Next ] ).unwrap();
    listener.join().unwrap().unwrap();

    assert!( !paths.exists() );
    let session = session.lock().unwrap();
    assert_eq!( session.state().current.as_deref(), Some( "/music/a.ogg" ) );
}


#[test]
fn test_unknown_tokens_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let ( paths, session ) = start_session( &dir );

    let listener = {
        let session = Arc::clone( &session );
        let pipe = paths.pipe();
        thread::spawn( move || channel::listen( &pipe, &session ) )
    };

    // A blocking open waits for the listener to open its end.
    let mut writer = fs::OpenOptions::new().write( true ).open( paths.pipe() ).unwrap();
    writer.write_all( b"louder\nnext   bogus\tmute exit" ).unwrap();
    drop( writer );

    listener.join().unwrap().unwrap();

    let session = session.lock().unwrap();
    assert_eq!( session.state().current.as_deref(), Some( "/music/a.ogg" ) );
    assert_eq!( session.state().volume, 0.0 );
}


#[test]
fn test_commands_apply_while_writer_stays_open() {
    let dir = tempfile::tempdir().unwrap();
    let ( paths, session ) = start_session( &dir );

    let listener = {
        let session = Arc::clone( &session );
        let pipe = paths.pipe();
        thread::spawn( move || channel::listen( &pipe, &session ) )
    };

    let mut writer = fs::OpenOptions::new().write( true ).open( paths.pipe() ).unwrap();
    writer.write_all( b"next pause\n" ).unwrap();

    let status = wait_for( &paths, |s| s.paused );
    assert_eq!( status.playing.as_deref(), Some( "/music/a.ogg" ) );

    // A token split across two writes is applied once it is complete.
    writer.write_all( b"res" ).unwrap();
    writer.write_all( b"ume " ).unwrap();
    wait_for( &paths, |s| !s.paused );

    writer.write_all( b"exit" ).unwrap();
    drop( writer );
    listener.join().unwrap().unwrap();
    assert!( !paths.exists() );
}
