/// Quality hint accepted by the resampling stage of the conversion pipeline
/// (spec §4.7).
///
/// The SINC backend maps this directly onto its own converter modes; the
/// fallback backends pick among polyphase/linear based on it (`best` and
/// `medium` both select polyphase, differing only in filter length; `fast`
/// selects the low-latency linear interpolator).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ResampleQuality {
    /// Highest quality, highest cost: SINC if available, else polyphase with
    /// a long filter.
    #[default]
    Best,
    /// Polyphase with a shorter filter (SINC backend's "medium" mode).
    Medium,
    /// Linear interpolation; lowest latency, lowest cost.
    Fast,
}
