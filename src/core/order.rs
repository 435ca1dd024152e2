//! Lock classes and their acquisition order
//!
//! Every [`Mutex`](crate::Mutex) carries a class as a type parameter. A thread
//! holding a lock of class `H` may only acquire a lock of class `C` when
//! `C::ORDER > H::ORDER`. The same table drives two checks:
//!
//! - statically, through [`AcquiredAfter`], which is implemented only for
//!   class pairs in increasing order and bounds
//!   [`MutexGuard::then_lock`](crate::MutexGuard::then_lock);
//! - at run time, through the per-thread holding stack consulted on every
//!   lock.

/// A compile-time lock class
pub trait LockClass: 'static {
    /// Position in the acquisition order, in `0..CLASS_COUNT`
    const ORDER: usize;
    /// Name used in diagnostics
    const NAME: &'static str;
}

/// Implemented for `Self` when a lock of class `Self` may be acquired while a
/// lock of class `H` is held.
pub trait AcquiredAfter<H: LockClass>: LockClass {}

macro_rules! lock_classes {
    ($($ty:ident = $order:expr, $name:literal;)+) => {
        $(
            #[doc = concat!("Lock class `", $name, "`")]
            #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
            pub struct $ty;

            impl LockClass for $ty {
                const ORDER: usize = $order;
                const NAME: &'static str = $name;
            }
        )+

        /// Class names indexed by order
        pub const MUTEX_NAMES: &[&str] = &[$($name),+];

        lock_classes!(@after [] $($ty)+);
    };

    (@after [$($held:ident)*]) => {};
    (@after [$($held:ident)*] $next:ident $($rest:ident)*) => {
        $(impl AcquiredAfter<$held> for $next {})*
        lock_classes!(@after [$($held)* $next] $($rest)*);
    };
}

lock_classes! {
    SpatializerMutex = 0, "Spatializer_Mutex";
    AudioPolicyEffectsMutex = 1, "AudioPolicyEffects_Mutex";
    EffectHandleMutex = 2, "EffectHandle_Mutex";
    EffectBasePolicyMutex = 3, "EffectBase_PolicyMutex";
    AudioPolicyServiceMutex = 4, "AudioPolicyService_Mutex";
    CommandThreadMutex = 5, "CommandThread_Mutex";
    AudioCommandMutex = 6, "AudioCommand_Mutex";
    UidPolicyMutex = 7, "UidPolicy_Mutex";
    AudioFlingerMutex = 8, "AudioFlinger_Mutex";
    DeviceEffectManagerMutex = 9, "DeviceEffectManager_Mutex";
    DeviceEffectProxyProxyMutex = 10, "DeviceEffectProxy_ProxyMutex";
    DeviceEffectHandleMutex = 11, "DeviceEffectHandle_Mutex";
    PatchCommandThreadMutex = 12, "PatchCommandThread_Mutex";
    ThreadBaseMutex = 13, "ThreadBase_Mutex";
    AudioFlingerClientMutex = 14, "AudioFlinger_ClientMutex";
    EffectChainMutex = 15, "EffectChain_Mutex";
    EffectBaseMutex = 16, "EffectBase_Mutex";
    AudioFlingerHardwareMutex = 17, "AudioFlinger_HardwareMutex";
    MelReporterMutex = 18, "MelReporter_Mutex";
    AudioFlingerUnregisteredWritersMutex = 19, "AudioFlinger_UnregisteredWritersMutex";
    AsyncCallbackThreadMutex = 20, "AsyncCallbackThread_Mutex";
    ConfigEventMutex = 21, "ConfigEvent_Mutex";
    OutputTrackTrackMetadataMutex = 22, "OutputTrack_TrackMetadataMutex";
    PassthruPatchRecordReadMutex = 23, "PassthruPatchRecord_ReadMutex";
    PatchCommandThreadListenerMutex = 24, "PatchCommandThread_ListenerMutex";
    PlaybackThreadAudioTrackCbMutex = 25, "PlaybackThread_AudioTrackCbMutex";
    AudioPolicyServiceNotificationClientsMutex = 26, "AudioPolicyService_NotificationClientsMutex";
    MediaLogNotifierMutex = 27, "MediaLogNotifier_Mutex";
    OtherMutex = 28, "OtherMutex";
}

/// Number of lock classes
pub const CLASS_COUNT: usize = MUTEX_NAMES.len();

/// Class of mutexes created without an explicit class
pub type DefaultClass = OtherMutex;

/// Order of [`DefaultClass`]
pub const DEFAULT_ORDER: usize = <DefaultClass as LockClass>::ORDER;

/// Marker for mutexes whose order is chosen at construction
///
/// Such mutexes are built with [`Mutex::with_order`](crate::Mutex::with_order)
/// and are checked only at run time. `ORDER` is the order used by
/// [`Mutex::new`](crate::Mutex::new).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Dynamic;

impl LockClass for Dynamic {
    const ORDER: usize = DEFAULT_ORDER;
    const NAME: &'static str = "Dynamic";
}

/// Name of the class at `order`, or `"unknown"` when out of range
pub fn class_name(order: usize) -> &'static str {
    MUTEX_NAMES.get(order).copied().unwrap_or("unknown")
}
