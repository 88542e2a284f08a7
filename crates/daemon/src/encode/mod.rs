//! Encoding modules for the conversion daemon

pub mod prores;

pub use prores::{
    build_ffmpeg_command, build_prores_args, ConversionOptions, EncodeError, ProresEncodeParams,
};
