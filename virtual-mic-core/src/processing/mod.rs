pub mod pcm_convert;
pub mod ring_buffer;
pub mod wav_format;
