//! Audio output via cpal
//!
//! Opens the default output device and feeds it from a shared PCM buffer
//! that the decode thread fills.

use std::collections::VecDeque;
use std::sync::atomic::{ AtomicBool, AtomicU32, Ordering };
use std::sync::{ Arc, Mutex, MutexGuard, PoisonError };

use cpal::traits::{ DeviceTrait, HostTrait, StreamTrait };
use thiserror::Error;


/// Errors that can occur with audio output.
#[derive( Debug, Error )]
pub enum OutputError {
    #[error( "No output device available" )]
    NoDevice,

    #[error( "Failed to get stream config: {0}" )]
    StreamConfig( String ),

    #[error( "Failed to build output stream: {0}" )]
    BuildStream( String ),

    #[error( "Failed to play stream: {0}" )]
    PlayStream( String ),
}


/// PCM ring shared between the decode thread (producer) and the audio
/// callback (consumer). Converts between source and device channel counts
/// and applies volume on the way out.
pub struct PcmBuffer {
    buffer: Mutex<VecDeque<f32>>,
    capacity: usize,
    paused: AtomicBool,
    /// f32 bits, 0.0 to 1.0
    volume: AtomicU32,
    source_channels: usize,
    output_channels: usize,
}


impl PcmBuffer {
    pub fn new( capacity: usize, source_channels: u16, output_channels: u16 ) -> Self {
        Self {
            buffer: Mutex::new( VecDeque::with_capacity( capacity ) ),
            capacity,
            paused: AtomicBool::new( false ),
            volume: AtomicU32::new( 1.0_f32.to_bits() ),
            source_channels: source_channels.max( 1 ) as usize,
            output_channels: output_channels.max( 1 ) as usize,
        }
    }


    fn samples( &self ) -> MutexGuard<'_, VecDeque<f32>> {
        self.buffer.lock().unwrap_or_else( PoisonError::into_inner )
    }


    /// Pushes as many samples as fit. Returns the number pushed.
    pub fn push( &self, samples: &[f32] ) -> usize {
        let mut buf = self.samples();
        let to_push = samples.len().min( self.capacity.saturating_sub( buf.len() ) );
        buf.extend( samples[ ..to_push ].iter().copied() );
        to_push
    }


    /// Fills `output` with device frames, padding with silence. Returns the
    /// number of samples that carried audio.
    pub fn pop( &self, output: &mut [f32] ) -> usize {
        output.fill( 0.0 );
        if self.paused.load( Ordering::Relaxed ) {
            return 0;
        }

        let volume = f32::from_bits( self.volume.load( Ordering::Relaxed ) );
        let src_ch = self.source_channels;
        let out_ch = self.output_channels;
        let mut buf = self.samples();

        let frames = ( output.len() / out_ch ).min( buf.len() / src_ch );
        let mut frame = vec![ 0.0_f32; src_ch ];

        for out_frame in output.chunks_exact_mut( out_ch ).take( frames ) {
            for slot in frame.iter_mut() {
                *slot = buf.pop_front().unwrap_or( 0.0 );
            }

            if src_ch == 2 && out_ch == 1 {
                out_frame[ 0 ] = ( frame[ 0 ] + frame[ 1 ] ) * 0.5;
            } else {
                // Extra device channels repeat the last source channel.
                for ( ch, sample ) in out_frame.iter_mut().enumerate() {
                    *sample = frame[ ch.min( src_ch - 1 ) ];
                }
            }

            for sample in out_frame.iter_mut() {
                *sample *= volume;
            }
        }

        frames * out_ch
    }


    pub fn len( &self ) -> usize {
        self.samples().len()
    }


    pub fn is_empty( &self ) -> bool {
        self.samples().is_empty()
    }


    pub fn clear( &self ) {
        self.samples().clear();
    }


    pub fn set_paused( &self, paused: bool ) {
        self.paused.store( paused, Ordering::Relaxed );
    }


    pub fn is_paused( &self ) -> bool {
        self.paused.load( Ordering::Relaxed )
    }


    pub fn set_volume( &self, volume: f32 ) {
        self.volume.store( volume.to_bits(), Ordering::Relaxed );
    }
}


/// Audio output handler.
/// Not Send: `cpal::Stream` must stay where it was built.
pub struct AudioOutput {
    stream: cpal::Stream,
    sample_rate: u32,
}


impl AudioOutput {
    /// Opens the default device for a source format and returns the output
    /// with the buffer to push decoded samples into.
    pub fn new(
        source_sample_rate: u32,
        source_channels: u16,
    ) -> Result<( Self, Arc<PcmBuffer> ), OutputError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or( OutputError::NoDevice )?;

        tracing::debug!( "Using output device: {:?}", device.name() );

        let supported: Vec<_> = device
            .supported_output_configs()
            .map_err( |e| OutputError::StreamConfig( e.to_string() ) )?
            .collect();

        let fits_rate = |c: &cpal::SupportedStreamConfigRange| {
            c.min_sample_rate().0 <= source_sample_rate && c.max_sample_rate().0 >= source_sample_rate
        };

        // Exact match first, then any channel count at the source rate, then
        // the device default (the decode thread resamples in that case).
        let config = if let Some( c ) = supported.iter().find( |c| c.channels() == source_channels && fits_rate( c ) ) {
            c.clone().with_sample_rate( cpal::SampleRate( source_sample_rate ) ).config()
        } else if let Some( c ) = supported.iter().find( |c| fits_rate( c ) ) {
            c.clone().with_sample_rate( cpal::SampleRate( source_sample_rate ) ).config()
        } else {
            device
                .default_output_config()
                .map_err( |e| OutputError::StreamConfig( e.to_string() ) )?
                .config()
        };

        tracing::debug!( "Audio output config: {} Hz, {} channels", config.sample_rate.0, config.channels );

        // About half a second of audio.
        let capacity = ( config.sample_rate.0 as usize ) * ( source_channels.max( 1 ) as usize ) / 2;
        let pcm = Arc::new( PcmBuffer::new( capacity, source_channels, config.channels ) );
        let consumer = Arc::clone( &pcm );

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    consumer.pop( data );
                },
                |err| {
                    tracing::error!( "Audio output error: {}", err );
                },
                None,
            )
            .map_err( |e| OutputError::BuildStream( e.to_string() ) )?;

        Ok(( Self { stream, sample_rate: config.sample_rate.0 }, pcm ))
    }


    pub fn play( &self ) -> Result<(), OutputError> {
        self.stream.play().map_err( |e| OutputError::PlayStream( e.to_string() ) )
    }


    /// The device sample rate.
    pub fn sample_rate( &self ) -> u32 {
        self.sample_rate
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_push_respects_capacity() {
        let buf = PcmBuffer::new( 4, 2, 2 );
        assert_eq!( buf.push( &[ 0.1; 6 ] ), 4 );
        assert_eq!( buf.len(), 4 );
    }


    #[test]
    fn test_mono_to_stereo_and_volume() {
        let buf = PcmBuffer::new( 16, 1, 2 );
        buf.set_volume( 0.5 );
        buf.push( &[ 1.0, 0.5 ] );

        let mut out = [ 9.0; 6 ];
        assert_eq!( buf.pop( &mut out ), 4 );
        assert_eq!( out, [ 0.5, 0.5, 0.25, 0.25, 0.0, 0.0 ] );
    }


    #[test]
    fn test_stereo_to_mono_mixes() {
        let buf = PcmBuffer::new( 16, 2, 1 );
        buf.push( &[ 1.0, 0.0, 0.5, 0.5 ] );

        let mut out = [ 0.0; 2 ];
        buf.pop( &mut out );
        assert_eq!( out, [ 0.5, 0.5 ] );
    }


    #[test]
    fn test_paused_outputs_silence() {
        let buf = PcmBuffer::new( 16, 2, 2 );
        buf.push( &[ 1.0; 4 ] );
        buf.set_paused( true );

        let mut out = [ 9.0; 4 ];
        assert_eq!( buf.pop( &mut out ), 0 );
        assert_eq!( out, [ 0.0; 4 ] );
        assert_eq!( buf.len(), 4 );
    }
}
