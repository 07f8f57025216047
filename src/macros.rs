// Trace raw register traffic when built with `debug_packets`; compiles
// to nothing otherwise.
macro_rules! regdbg {
    ($dir:expr, $addr:expr, $val:expr) => {
        #[cfg(feature="debug_packets")] {
            log::trace!("{} [0x{:02x}] 0x{:08x}", $dir, $addr, $val);
        }
    };
}
