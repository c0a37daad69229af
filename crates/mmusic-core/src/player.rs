//! Local file playback engine
//!
//! [`Player`] implements [`MediaEngine`] on top of the Symphonia decoder and
//! the cpal output. Each played track gets its own decode thread, which
//! reports the end of the track, or a failure, through the engine event
//! channel.

use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rubato::{ FastFixedOut, PolynomialDegree, Resampler };

use crate::decoder::Decoder;
use crate::engine::{ event_channel, uri_to_path, EngineError, EngineEvent, EngineEvents, EventSender, MediaEngine };
use crate::output::{ AudioOutput, PcmBuffer };


/// Converts planar samples back to interleaved format.
/// [[L0, L1, ...], [R0, R1, ...]] → [L0, R0, L1, R1, ...]
fn interleave( channels: &[Vec<f32>] ) -> Vec<f32> {
    if channels.is_empty() || channels[ 0 ].is_empty() {
        return Vec::new();
    }
    let frames = channels[ 0 ].len();
    let mut out = Vec::with_capacity( frames * channels.len() );
    for f in 0..frames {
        for ch in channels {
            out.push( ch[ f ] );
        }
    }
    out
}


/// Wrapper that lets the cpal stream live inside the engine.
///
/// SAFETY: the stream is started on the thread that built it and is never
/// touched again except to be dropped, which the supported hosts (ALSA,
/// PulseAudio, CoreAudio) allow from any thread. All audio data goes through
/// the `PcmBuffer`, which is Sync.
struct AudioOutputHandle( #[allow( dead_code )] AudioOutput );

unsafe impl Send for AudioOutputHandle {}


/// Everything that belongs to one playing track.
struct PlaybackHandle {
    stop_flag: Arc<AtomicBool>,
    pcm: Arc<PcmBuffer>,
    // Dropped after the decode thread has been joined, which stops the stream.
    _output: AudioOutputHandle,
    thread: Option<thread::JoinHandle<()>>,
}


/// Audio engine for local files.
pub struct Player {
    location: Option<String>,
    playback: Option<PlaybackHandle>,
    volume: f32,
    events: EventSender,
}


impl Player {
    /// Creates a player and the event handle the session's poller reads.
    pub fn new() -> ( Self, EngineEvents ) {
        let ( events, rx ) = event_channel();
        let player = Self {
            location: None,
            playback: None,
            volume: 1.0,
            events,
        };
        ( player, rx )
    }


    /// Reports a failure for the track being started so the session skips it.
    fn fail( &self, message: String ) {
        let generation = self.events.begin();
        self.events.send( generation, EngineEvent::Error( message ) );
    }


    fn start( &mut self, uri: &str ) -> Result<(), EngineError> {
        let path = uri_to_path( uri ).ok_or_else( || EngineError::Unsupported( uri.to_string() ) )?;

        let decoder = Decoder::open( &path ).map_err( |e| EngineError::Backend( format!( "{:?}: {}", path, e ) ) )?;
        let source_rate = decoder.sample_rate();
        let channels = decoder.channels() as u16;

        let ( output, pcm ) = AudioOutput::new( source_rate, channels )
            .map_err( |e| EngineError::Backend( e.to_string() ) )?;
        pcm.set_volume( self.volume );

        let target_rate = output.sample_rate();
        output.play().map_err( |e| EngineError::Backend( e.to_string() ) )?;

        let resampler = if source_rate != target_rate {
            tracing::debug!( "Resampling: {} Hz → {} Hz", source_rate, target_rate );
            let resampler = FastFixedOut::<f32>::new(
                target_rate as f64 / source_rate as f64,
                2.0,
                PolynomialDegree::Cubic,
                1024,
                channels as usize,
            ).map_err( |e| EngineError::Backend( format!( "Failed to create resampler: {}", e ) ) )?;
            Some( resampler )
        } else {
            None
        };

        let stop_flag = Arc::new( AtomicBool::new( false ) );
        let job = DecodeJob {
            decoder,
            pcm: Arc::clone( &pcm ),
            stop_flag: Arc::clone( &stop_flag ),
            resampler,
            events: self.events.clone(),
            generation: self.events.begin(),
        };
        let thread = thread::spawn( move || job.run() );

        self.playback = Some( PlaybackHandle {
            stop_flag,
            pcm,
            _output: AudioOutputHandle( output ),
            thread: Some( thread ),
        });

        tracing::debug!( "Started {:?}", path );
        Ok(())
    }
}


impl MediaEngine for Player {
    fn set_location( &mut self, uri: &str ) -> Result<(), EngineError> {
        if uri_to_path( uri ).is_none() {
            self.location = None;
            self.fail( format!( "unsupported location {}", uri ) );
            return Err( EngineError::Unsupported( uri.to_string() ) );
        }
        self.location = Some( uri.to_string() );
        Ok(())
    }


    /// Starts the loaded location, or resumes it if it is already running.
    fn play( &mut self ) -> Result<(), EngineError> {
        if let Some( ref handle ) = self.playback {
            handle.pcm.set_paused( false );
            return Ok(());
        }

        let uri = self.location.clone().ok_or( EngineError::NoLocation )?;
        let result = self.start( &uri );
        if let Err( ref e ) = result {
            self.fail( e.to_string() );
        }
        result
    }


    fn pause( &mut self ) -> Result<(), EngineError> {
        if let Some( ref handle ) = self.playback {
            handle.pcm.set_paused( true );
        }
        Ok(())
    }


    fn stop( &mut self ) -> Result<(), EngineError> {
        // Anything the old track still reports is stale from here on.
        self.events.begin();

        if let Some( mut handle ) = self.playback.take() {
            handle.stop_flag.store( true, Ordering::Relaxed );
            handle.pcm.clear();
            if let Some( thread ) = handle.thread.take() {
                if thread.join().is_err() {
                    tracing::error!( "Decode thread panicked" );
                }
            }
        }
        Ok(())
    }


    fn set_volume( &mut self, volume: f32 ) {
        self.volume = volume;
        if let Some( ref handle ) = self.playback {
            handle.pcm.set_volume( volume );
        }
    }
}


impl Drop for Player {
    fn drop( &mut self ) {
        let _ = self.stop();
    }
}


/// State moved into a decode thread.
struct DecodeJob {
    decoder: Decoder,
    pcm: Arc<PcmBuffer>,
    stop_flag: Arc<AtomicBool>,
    resampler: Option<FastFixedOut<f32>>,
    events: EventSender,
    generation: u64,
}


impl DecodeJob {
    fn stopped( &self ) -> bool {
        self.stop_flag.load( Ordering::Relaxed )
    }


    fn run( mut self ) {
        let channels = self.decoder.channels().max( 1 );
        // Keep about 50ms decoded ahead of the device.
        let target_buffer = ( self.decoder.sample_rate() as usize * channels ) / 20;
        let mut planar: Vec<Vec<f32>> = ( 0..channels ).map( |_| Vec::new() ).collect();

        loop {
            if self.stopped() {
                tracing::debug!( "Decode loop: stop signal received" );
                return;
            }

            if self.pcm.is_paused() || self.pcm.len() > target_buffer {
                thread::sleep( Duration::from_millis( 5 ) );
                continue;
            }

            match self.decoder.decode_next() {
                Ok( Some( samples ) ) => {
                    let samples = self.resample( samples, channels, &mut planar );
                    self.push_all( &samples );
                }
                Ok( None ) => {
                    self.flush( &planar );
                    while !self.pcm.is_empty() && !self.stopped() {
                        thread::sleep( Duration::from_millis( 10 ) );
                    }
                    if !self.stopped() {
                        tracing::debug!( "Decode loop: end of stream" );
                        self.events.send( self.generation, EngineEvent::EndOfStream );
                    }
                    return;
                }
                Err( e ) => {
                    tracing::error!( "Decode error: {}", e );
                    self.events.send( self.generation, EngineEvent::Error( e.to_string() ) );
                    return;
                }
            }
        }
    }


    /// Feeds interleaved samples through the resampler, if there is one.
    fn resample( &mut self, samples: Vec<f32>, channels: usize, planar: &mut [Vec<f32>] ) -> Vec<f32> {
        let Some( ref mut resampler ) = self.resampler else {
            return samples;
        };

        for chunk in samples.chunks( channels ) {
            for ( ch, sample ) in chunk.iter().enumerate() {
                planar[ ch ].push( *sample );
            }
        }

        let mut out = Vec::new();
        while planar[ 0 ].len() >= resampler.input_frames_next() {
            let needed = resampler.input_frames_next();
            let input: Vec<Vec<f32>> = planar.iter_mut().map( |ch| ch.drain( ..needed ).collect() ).collect();
            match resampler.process( &input, None ) {
                Ok( resampled ) => out.extend( interleave( &resampled ) ),
                Err( e ) => {
                    tracing::error!( "Resample error: {}", e );
                    break;
                }
            }
        }
        out
    }


    /// Pushes what is left in the resampler at end of stream.
    fn flush( &mut self, planar: &[Vec<f32>] ) {
        let remaining = match self.resampler {
            Some( ref mut resampler ) if !planar[ 0 ].is_empty() => {
                match resampler.process_partial( Some( planar ), None ) {
                    Ok( resampled ) => interleave( &resampled ),
                    Err( e ) => {
                        tracing::error!( "Final resample error: {}", e );
                        return;
                    }
                }
            }
            _ => return,
        };
        self.push_all( &remaining );
    }


    fn push_all( &self, samples: &[f32] ) {
        let mut offset = 0;
        while offset < samples.len() && !self.stopped() {
            let pushed = self.pcm.push( &samples[ offset.. ] );
            offset += pushed;
            if pushed == 0 {
                thread::sleep( Duration::from_millis( 5 ) );
            }
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_interleave() {
        let planar = vec![ vec![ 1.0, 2.0 ], vec![ 3.0, 4.0 ] ];
        assert_eq!( interleave( &planar ), vec![ 1.0, 3.0, 2.0, 4.0 ] );
    }


    #[test]
    fn test_remote_locations_are_skipped() {
        let ( mut player, events ) = Player::new();
        assert!( matches!( player.set_location( "http://radio/stream" ), Err( EngineError::Unsupported( _ ) ) ) );
        assert!( matches!( events.poll( Duration::from_millis( 100 ) ), EngineEvent::Error( _ ) ) );
    }


    #[test]
    fn test_unreadable_file_reports_error() {
        let ( mut player, events ) = Player::new();
        player.set_location( "file:///nonexistent/track.flac" ).unwrap();

        assert!( player.play().is_err() );
        assert!( matches!( events.poll( Duration::from_millis( 100 ) ), EngineEvent::Error( _ ) ) );
    }
}
