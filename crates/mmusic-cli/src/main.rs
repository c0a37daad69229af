//! mmterm - terminal client for mmusicd

mod app;
mod cli;
mod input;
mod search;
mod settings;
mod view;

use std::fs::{ self, OpenOptions };
use std::io::{ self, Stdout };
use std::sync::{ Arc, Mutex, MutexGuard, PoisonError };
use std::thread;
use std::time::Duration;

use anyhow::{ bail, Context, Result };
use clap::Parser;
use crossterm::{
    event::{ self, Event, KeyEventKind },
    terminal::{ disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen },
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::Paragraph,
};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use app::{ App, PipeRemote };
use cli::Args;
use input::InputMode;
use settings::Settings;

use mmusic_core::SessionPaths;


/// Terminal and application state, shared by the input loop, the redraw
/// timer and the queue poller.
struct Ui {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    app: App,
}


impl Ui {
    fn draw( &mut self ) {
        let app = &mut self.app;
        if let Err( e ) = self.terminal.draw( |frame| draw_ui( frame, app ) ) {
            tracing::error!( "Draw failed: {}", e );
        }
    }
}


type SharedUi = Arc<Mutex<Ui>>;


fn lock( ui: &SharedUi ) -> MutexGuard<'_, Ui> {
    ui.lock().unwrap_or_else( PoisonError::into_inner )
}


/// Logs go to a file; the terminal belongs to the UI.
fn init_logging() {
    let Some( dir ) = dirs::data_dir().map( |d| d.join( "mmusic" ) ) else {
        return;
    };
    if fs::create_dir_all( &dir ).is_err() {
        return;
    }
    let Ok( file ) = OpenOptions::new().create( true ).append( true ).open( dir.join( "mmterm.log" ) ) else {
        return;
    };

    tracing_subscriber::registry()
        .with( tracing_subscriber::fmt::layer().with_writer( Mutex::new( file ) ).with_ansi( false ) )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else( |_| tracing_subscriber::EnvFilter::new( "info" ) ),
        )
        .init();
}


fn main() -> Result<()> {
    let args = Args::parse();
    let settings = Settings::load();
    init_logging();

    let paths = SessionPaths::new( args.session_dir.clone().unwrap_or_else( SessionPaths::default_root ) );
    if !paths.exists() {
        bail!( "No session at {:?}. Is mmusicd running?", paths.root() );
    }

    let playlists_dir = args.playlists.clone().unwrap_or_else( || settings.playlists_dir() );
    let remote = Box::new( PipeRemote::new( paths.pipe() ) );
    let app = App::new( paths, playlists_dir, remote );

    enable_raw_mode()?;
    io::stdout().execute( EnterAlternateScreen )?;
    let terminal = Terminal::new( CrosstermBackend::new( io::stdout() ) ).context( "Failed to open terminal" );

    let result = terminal.and_then( |terminal| run( Arc::new( Mutex::new( Ui { terminal, app } ) ), &settings ) );

    disable_raw_mode()?;
    io::stdout().execute( LeaveAlternateScreen )?;

    result
}


fn run( ui: SharedUi, settings: &Settings ) -> Result<()> {
    spawn_redraw_timer( Arc::clone( &ui ), settings.redraw_interval() );
    lock( &ui ).draw();

    loop {
        let event = event::read()?;

        let mut guard = lock( &ui );
        match event {
            Event::Key( key ) if key.kind == KeyEventKind::Press => {
                guard.app.handle_key( key.code, key.modifiers );
            }
            Event::Resize( _, _ ) => {}
            _ => continue,
        }

        if guard.app.should_quit {
            return Ok(());
        }

        if guard.app.start_queue_poll() {
            spawn_queue_poller( Arc::clone( &ui ), settings.queue_poll_interval() );
        }

        guard.draw();
    }
}


/// Repaints periodically so the status bar follows the daemon.
fn spawn_redraw_timer( ui: SharedUi, interval: Duration ) {
    thread::spawn( move || loop {
        thread::sleep( interval );

        let mut guard = lock( &ui );
        if guard.app.should_quit {
            return;
        }
        guard.app.tick();
        guard.draw();
    });
}


/// Re-reads the queue while the Queue view is on screen. Ends itself once
/// another view is active.
fn spawn_queue_poller( ui: SharedUi, interval: Duration ) {
    tracing::debug!( "Queue poller started" );

    thread::spawn( move || loop {
        thread::sleep( interval );

        let mut guard = lock( &ui );
        if !guard.app.queue_poll_tick() {
            tracing::debug!( "Queue poller stopped" );
            return;
        }
        guard.draw();
    });
}


/// Draws the main UI.
fn draw_ui( frame: &mut Frame, app: &mut App ) {
    let prompt = matches!( app.input_mode, InputMode::Search( _ ) );

    let chunks = Layout::default()
        .direction( Direction::Vertical )
        .constraints([
            Constraint::Min( 0 ),                                  // List
            Constraint::Length( if prompt { 1 } else { 0 } ),      // Prompt
            Constraint::Length( 1 ),                               // Status bar
        ])
        .split( frame.area() );

    app.page_height = chunks[0].height.max( 1 ) as usize;
    let height = app.page_height;
    app.views.active_mut().fit( height );

    draw_list( frame, app, chunks[0] );
    if prompt {
        draw_prompt( frame, app, chunks[1] );
    }
    draw_status_bar( frame, app, chunks[2] );
}


fn draw_list( frame: &mut Frame, app: &App, area: Rect ) {
    let view = app.views.active();
    let ( _, shown ) = view.visible( area.height as usize );
    let cursor_row = view.from_top();

    let lines: Vec<Line> = shown
        .iter()
        .enumerate()
        .map( |( row, entry )| {
            if row == cursor_row {
                Line::styled( entry.as_str(), Style::default().add_modifier( Modifier::REVERSED ) )
            } else {
                Line::raw( entry.as_str() )
            }
        })
        .collect();

    frame.render_widget( Paragraph::new( lines ), area );
}


fn draw_prompt( frame: &mut Frame, app: &App, area: Rect ) {
    let InputMode::Search( direction ) = app.input_mode else {
        return;
    };

    let text = format!( "{}{}", direction.prompt(), app.input.content() );
    frame.render_widget( Paragraph::new( text ).style( Style::default().fg( Color::Yellow ) ), area );

    let cursor_x = area.x + 1 + app.input.cursor_char_pos() as u16;
    frame.set_cursor_position(( cursor_x.min( area.right().saturating_sub( 1 ) ), area.y ));
}


/// `R`/`P` flags, the playing entry (or a status message) and the volume.
fn draw_status_bar( frame: &mut Frame, app: &App, area: Rect ) {
    let status = app.status();
    let bar = Style::default().fg( Color::White ).bg( Color::Black ).add_modifier( Modifier::BOLD );

    let chunks = Layout::default()
        .direction( Direction::Horizontal )
        .constraints([
            Constraint::Length( 4 ),
            Constraint::Min( 0 ),
            Constraint::Length( 20 ),
        ])
        .split( area );

    let flags = format!(
        "{}{}",
        if status.random { 'R' } else { ' ' },
        if status.paused { 'P' } else { ' ' },
    );

    let middle = match app.status_message() {
        Some( msg ) => msg.to_string(),
        None => status.playing.unwrap_or_default(),
    };

    let view = app.views.active();
    let mut right = format!( "{} {}", app.views.active_kind().title(), view.len() );
    if let Some( volume ) = status.volume {
        right = format!( "{} {:>3}%", right, volume );
    }

    frame.render_widget( Paragraph::new( flags ).style( bar ), chunks[0] );
    frame.render_widget( Paragraph::new( middle ).style( bar ), chunks[1] );
    frame.render_widget( Paragraph::new( right ).style( bar ).alignment( Alignment::Right ), chunks[2] );
}
