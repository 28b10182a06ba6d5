quick_error! {
    /// Error taxonomy of the reader.
    ///
    /// The enum is `Clone` because an error met while growing the HDU chain
    /// is recorded on the chain node and handed back to every later caller
    /// that walks past that node.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Error {
        /// The underlying source reported an i/o failure.
        Io(kind: std::io::ErrorKind) {
            from(err: std::io::Error) -> (err.kind())
            display("i/o error from the source: {:?}", kind)
        }
        /// The path could not be opened.
        NotFound {
            display("no such file")
        }
        /// The byte stream is not a FITS structure this reader can decode.
        IllegalSequence(reason: &'static str) {
            display("invalid FITS stream: {}", reason)
        }
        /// A requested range does not fit in the positive signed 64-bit space.
        InvalidArgument {
            display("requested offset and size are out of range")
        }
        /// An allocation was refused.
        OutOfMemory {
            display("allocation failed")
        }
    }
}
