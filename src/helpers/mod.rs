pub mod murmur;
