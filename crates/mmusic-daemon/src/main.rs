//! mmusicd - playback daemon
//!
//! Creates the session directory, starts playing, and then serves commands
//! from the session pipe until told to exit or signalled.

mod cli;
mod seed;

use std::fs::OpenOptions;
use std::process;
use std::sync::{ Arc, Mutex, PoisonError };
use std::thread;
use std::time::Duration;

use anyhow::{ Context, Result };
use clap::Parser;
use tokio::signal::unix::{ signal, SignalKind };
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use cli::Args;

use mmusic_core::channel::{ self, SharedSession };
use mmusic_core::engine::EngineEvents;
use mmusic_core::{ EngineEvent, MediaEngine, PlayMode, Session, SessionOptions, SessionPaths };


/// How long the event poller waits for an engine event per round.
const EVENT_POLL_INTERVAL: Duration = Duration::from_millis( 250 );

/// Pause after an engine error, so a library of unplayable entries does
/// not turn into a busy loop.
const ERROR_BACKOFF: Duration = Duration::from_millis( 200 );


fn init_logging( args: &Args ) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else( |_| tracing_subscriber::EnvFilter::new( "info" ) );

    match args.log_file {
        Some( ref path ) => {
            let file = OpenOptions::new()
                .create( true )
                .append( true )
                .open( path )
                .with_context( || format!( "Failed to open log file {:?}", path ) )?;
            tracing_subscriber::registry()
                .with( tracing_subscriber::fmt::layer().with_writer( Mutex::new( file ) ).with_ansi( false ) )
                .with( filter )
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with( tracing_subscriber::fmt::layer().with_writer( std::io::stderr ) )
                .with( filter )
                .init();
        }
    }
    Ok(())
}


#[cfg( feature = "audio" )]
fn build_engine() -> ( mmusic_core::Player, EngineEvents ) {
    mmusic_core::Player::new()
}


#[cfg( not( feature = "audio" ) )]
fn build_engine() -> ( mmusic_core::NullEngine, EngineEvents ) {
    tracing::warn!( "Built without audio support, nothing will be heard" );
    let ( _sender, events ) = mmusic_core::engine::event_channel();
    ( mmusic_core::NullEngine::default(), events )
}


#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging( &args )?;

    let paths = SessionPaths::new( args.session_dir.clone().unwrap_or_else( SessionPaths::default_root ) );
    paths.create().context( "Failed to create session" )?;

    let ( engine, events ) = build_engine();
    let session = match start( &args, &paths, engine ) {
        Ok( session ) => session,
        Err( e ) => {
            let _ = paths.remove();
            return Err( e );
        }
    };

    spawn_listener( &paths, &session )?;
    spawn_event_poller( events, &session )?;

    wait_for_signal().await?;
    tracing::info!( "Signal received" );

    let mut session = session.lock().unwrap_or_else( PoisonError::into_inner );
    session.exit()?;
    Ok(())
}


/// Seeds the playlist, loads the library and starts the first entry.
fn start<E: MediaEngine>( args: &Args, paths: &SessionPaths, engine: E ) -> Result<SharedSession<E>> {
    let stdin = args.stdin.then( std::io::stdin );
    let text = seed::collect( &args.playlists, stdin ).context( "Failed to read playlist from stdin" )?;
    seed::install( &paths.playlist(), &text ).context( "Failed to write session playlist" )?;

    let options = SessionOptions {
        mode: if args.random { PlayMode::Random } else { PlayMode::Sequential },
        volume: f32::from( args.volume ) / 100.0,
    };
    let mut session = Session::new( paths.clone(), engine, options )?;
    session.rescan().context( "Failed to load playlist" )?;
    session.advance()?;

    Ok( Arc::new( Mutex::new( session ) ) )
}


/// Serves the session pipe. The process ends when the channel does.
fn spawn_listener<E: MediaEngine + 'static>( paths: &SessionPaths, session: &SharedSession<E> ) -> Result<()> {
    let pipe = paths.pipe();
    let paths = paths.clone();
    let session = Arc::clone( session );

    thread::Builder::new()
        .name( "pipe".into() )
        .spawn( move || match channel::listen( &pipe, &session ) {
            Ok(()) => process::exit( 0 ),
            Err( e ) => {
                tracing::error!( "Command channel failed: {}", e );
                let _ = paths.remove();
                process::exit( 1 );
            }
        })
        .context( "Failed to spawn pipe listener" )?;
    Ok(())
}


/// Moves the session on when the engine finishes or fails a track.
fn spawn_event_poller<E: MediaEngine + 'static>( events: EngineEvents, session: &SharedSession<E> ) -> Result<()> {
    let session = Arc::clone( session );

    thread::Builder::new()
        .name( "engine-events".into() )
        .spawn( move || loop {
            let event = events.poll( EVENT_POLL_INTERVAL );
            if event == EngineEvent::None {
                continue;
            }

            let failed = matches!( event, EngineEvent::Error( _ ) );
            session
                .lock()
                .unwrap_or_else( PoisonError::into_inner )
                .handle_engine_event( event );

            if failed {
                thread::sleep( ERROR_BACKOFF );
            }
        })
        .context( "Failed to spawn event poller" )?;
    Ok(())
}


async fn wait_for_signal() -> Result<()> {
    let mut interrupt = signal( SignalKind::interrupt() )?;
    let mut terminate = signal( SignalKind::terminate() )?;

    tokio::select! {
        _ = interrupt.recv() => {}
        _ = terminate.recv() => {}
    }
    Ok(())
}
