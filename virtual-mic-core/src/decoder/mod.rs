pub mod audio_decoder;
