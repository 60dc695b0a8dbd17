// svndiff wire format.
//
// # Modules
//
// - `varint`    : Variable-length integer encoding (base-128, big-endian)
// - `header`    : Stream magic/version and per-window headers
// - `secondary` : zlib / LZ4 section compression (versions 1 and 2)
// - `encoder`   : Window serialization and the streaming encoder
// - `decoder`   : Push-based decoder and blocking window readers

pub mod decoder;
pub mod encoder;
pub mod header;
pub mod secondary;
pub mod varint;

pub use decoder::{
    DecodeError, DecoderOptions, StreamDecoder, decode_all, decode_instructions,
    read_stream_header, read_window, skip_window,
};
pub use encoder::{EncodeError, SvndiffEncoder, encode_all, encode_window};
pub use header::{MAGIC, SvndiffVersion, WindowHeader};
