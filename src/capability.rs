//! Pen/touch capability queries.
//!
//! The host exposes digitizer capabilities as a bitmask (`SM_DIGITIZER` on
//! Windows), a maximum touch count (`SM_MAXIMUMTOUCHES`), and a count of
//! attached pointer devices. [`MetricsSource`] abstracts those three raw reads;
//! [`CapabilityProbe`] turns them into the values the report needs.
//!
//! Queries never fail. A platform that cannot answer reports `0`, which reads
//! as "nothing present".

/// The digitizer is ready for input.
pub const NID_READY: u32 = 0x80;
/// The digitizer supports multiple simultaneous inputs.
pub const NID_MULTI_INPUT: u32 = 0x40;
/// An integrated pen digitizer is present.
pub const NID_INTEGRATED_PEN: u32 = 0x04;
/// An integrated touch digitizer is present.
pub const NID_INTEGRATED_TOUCH: u32 = 0x01;

/// Raw platform reads backing a [`CapabilityProbe`].
pub trait MetricsSource: Send + Sync {
    /// Digitizer capability bitmask (see the `NID_*` constants).
    fn digitizer_bits(&self) -> u32;

    /// Platform-reported maximum simultaneous touch points.
    ///
    /// Only meaningful when [`touch_points_available`] holds for the current bits.
    fn max_touches(&self) -> u32;

    /// Number of attached generic pointer/tablet devices.
    fn pointer_device_count(&self) -> usize;
}

/// A source that reports nothing. Used on platforms without a metrics backend.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullMetrics;

impl MetricsSource for NullMetrics {
    fn digitizer_bits(&self) -> u32 {
        0
    }
    fn max_touches(&self) -> u32 {
        0
    }
    fn pointer_device_count(&self) -> usize {
        0
    }
}

impl<T: MetricsSource + ?Sized> MetricsSource for Box<T> {
    fn digitizer_bits(&self) -> u32 {
        (**self).digitizer_bits()
    }
    fn max_touches(&self) -> u32 {
        (**self).max_touches()
    }
    fn pointer_device_count(&self) -> usize {
        (**self).pointer_device_count()
    }
}

/// Pen/touch presence decoded from a digitizer bitmask.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DigitizerFlags {
    pub has_pen: bool,
    pub has_touch: bool,
}

impl DigitizerFlags {
    /// Decode pen/touch bits. The two bits are independent.
    #[inline]
    pub fn from_bits(bits: u32) -> Self {
        Self {
            has_pen: bits & NID_INTEGRATED_PEN == NID_INTEGRATED_PEN,
            has_touch: bits & NID_INTEGRATED_TOUCH == NID_INTEGRATED_TOUCH,
        }
    }
}

/// `true` only when the digitizer is both ready and multi-input capable.
#[inline]
pub fn touch_points_available(bits: u32) -> bool {
    const GATE: u32 = NID_READY | NID_MULTI_INPUT;
    bits & GATE == GATE
}

/// Stateless capability queries over a [`MetricsSource`].
#[derive(Debug, Default)]
pub struct CapabilityProbe<M> {
    source: M,
}

impl<M: MetricsSource> CapabilityProbe<M> {
    pub fn new(source: M) -> Self {
        Self { source }
    }

    pub fn pointer_device_count(&self) -> usize {
        self.source.pointer_device_count()
    }

    pub fn digitizer_flags(&self) -> DigitizerFlags {
        DigitizerFlags::from_bits(self.source.digitizer_bits())
    }

    /// Maximum touch points, or `0` unless the digitizer reports READY and
    /// MULTI_INPUT together.
    pub fn max_touch_points(&self) -> u32 {
        if touch_points_available(self.source.digitizer_bits()) {
            self.source.max_touches()
        } else {
            0
        }
    }
}
