//! Command channel over the session pipe
//!
//! The daemon reads the named pipe in a loop, applying tokens to the session
//! as they arrive and reopening the pipe once the last writer has closed it.
//! Clients write a single message and close.

use std::fs::{ File, OpenOptions };
use std::io::{ self, Read, Write };
use std::os::unix::fs::OpenOptionsExt;
use std::path::{ Path, PathBuf };
use std::sync::{ Arc, Mutex, PoisonError };
use std::thread;
use std::time::Duration;

use nix::fcntl::OFlag;
use thiserror::Error;

use crate::command::{ encode_message, parse_message, Command };
use crate::engine::MediaEngine;
use crate::session::{ Flow, Session };


const READ_CHUNK: usize = 4096;
const SEND_ATTEMPTS: u32 = 25;
const SEND_RETRY_DELAY: Duration = Duration::from_millis( 20 );


/// A session shared between the daemon's threads.
pub type SharedSession<E> = Arc<Mutex<Session<E>>>;


/// Errors that can occur on the command channel.
#[derive( Debug, Error )]
pub enum ChannelError {
    #[error( "Failed to open pipe {path}: {source}" )]
    Open { path: PathBuf, source: io::Error },

    #[error( "Failed to read pipe {path}: {source}" )]
    Read { path: PathBuf, source: io::Error },

    #[error( "Failed to write pipe {path}: {source}" )]
    Write { path: PathBuf, source: io::Error },

    #[error( "No daemon is reading {0}" )]
    NotRunning( PathBuf ),
}


/// Reads commands from `pipe` and applies them until an `exit` command has
/// been handled. Commands after `exit` in the same message are dropped.
pub fn listen<E: MediaEngine>( pipe: &Path, session: &SharedSession<E> ) -> Result<(), ChannelError> {
    tracing::info!( "Listening on {:?}", pipe );

    loop {
        if serve( pipe, session )? == Flow::Exit {
            return Ok(());
        }
    }
}


/// Serves one open of the pipe: blocks until a writer opens it, then
/// applies every complete token as soon as it has been read. A token is
/// complete once whitespace follows it or every writer has closed the pipe.
fn serve<E: MediaEngine>( pipe: &Path, session: &SharedSession<E> ) -> Result<Flow, ChannelError> {
    let mut file = File::open( pipe )
        .map_err( |source| ChannelError::Open { path: pipe.to_path_buf(), source } )?;

    let mut pending = Vec::new();
    let mut buf = [ 0u8; READ_CHUNK ];
    loop {
        let n = match file.read( &mut buf ) {
            Ok( n ) => n,
            Err( e ) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err( source ) => return Err( ChannelError::Read { path: pipe.to_path_buf(), source } ),
        };

        if n == 0 {
            return Ok( apply( &pending, session ) );
        }
        pending.extend_from_slice( &buf[ ..n ] );

        // Whitespace is ASCII, so this never splits a UTF-8 sequence.
        if let Some( end ) = pending.iter().rposition( u8::is_ascii_whitespace ) {
            let complete: Vec<u8> = pending.drain( ..=end ).collect();
            if apply( &complete, session ) == Flow::Exit {
                return Ok( Flow::Exit );
            }
        }
    }
}


fn apply<E: MediaEngine>( raw: &[u8], session: &SharedSession<E> ) -> Flow {
    for command in parse_message( &String::from_utf8_lossy( raw ) ) {
        let flow = session
            .lock()
            .unwrap_or_else( PoisonError::into_inner )
            .dispatch( command );

        if flow == Flow::Exit {
            return Flow::Exit;
        }
    }
    Flow::Continue
}


/// Writes commands to the daemon as one message.
///
/// The pipe is opened without blocking so a missing daemon is reported
/// instead of hanging the caller. A daemon that is between two reads is
/// given a short grace period.
pub fn send( pipe: &Path, commands: &[Command] ) -> Result<(), ChannelError> {
    let mut message = encode_message( commands );
    message.push( '\n' );

    let mut file = open_writer( pipe )?;
    file.write_all( message.as_bytes() )
        .map_err( |source| ChannelError::Write { path: pipe.to_path_buf(), source } )?;

    tracing::debug!( "Sent {:?}", message.trim_end() );
    Ok(())
}


fn open_writer( pipe: &Path ) -> Result<File, ChannelError> {
    let mut attempt = 0;
    loop {
        let result = OpenOptions::new()
            .write( true )
            .custom_flags( OFlag::O_NONBLOCK.bits() )
            .open( pipe );

        match result {
            Ok( file ) => return Ok( file ),
            // ENXIO: the pipe exists but nobody has it open for reading.
            Err( e ) if e.raw_os_error() == Some( nix::libc::ENXIO ) => {
                attempt += 1;
                if attempt >= SEND_ATTEMPTS {
                    return Err( ChannelError::NotRunning( pipe.to_path_buf() ) );
                }
                thread::sleep( SEND_RETRY_DELAY );
            }
            Err( e ) if e.kind() == io::ErrorKind::NotFound => {
                return Err( ChannelError::NotRunning( pipe.to_path_buf() ) );
            }
            Err( source ) => return Err( ChannelError::Open { path: pipe.to_path_buf(), source } ),
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_send_without_pipe_reports_not_running() {
        let dir = tempfile::tempdir().unwrap();
        let result = send( &dir.path().join( "in" ), &[ Command::Next ] );
        assert!( matches!( result, Err( ChannelError::NotRunning( _ ) ) ) );
    }


    #[test]
    fn test_send_without_reader_reports_not_running() {
        let dir = tempfile::tempdir().unwrap();
        let pipe = dir.path().join( "in" );
        nix::unistd::mkfifo( &pipe, nix::sys::stat::Mode::S_IRWXU ).unwrap();

        let result = send( &pipe, &[ Command::Next ] );
        assert!( matches!( result, Err( ChannelError::NotRunning( _ ) ) ) );
    }
}
