//! Process loopback activation via `ActivateAudioInterfaceAsync`.
//!
//! The completion handler runs on an MTA worker thread; `ActivationWaiter`
//! turns it into a blocking call on the thread that asked for the session.

use windows::core::{Interface, IUnknown, HRESULT};
use windows::Win32::Foundation::E_NOINTERFACE;
use windows::Win32::Media::Audio::{
    ActivateAudioInterfaceAsync, IActivateAudioInterfaceAsyncOperation, IActivateAudioInterfaceCompletionHandler,
    IActivateAudioInterfaceCompletionHandler_Impl, IAudioClient, AUDIOCLIENT_ACTIVATION_PARAMS,
    AUDIOCLIENT_ACTIVATION_PARAMS_0, AUDIOCLIENT_ACTIVATION_TYPE_PROCESS_LOOPBACK,
    AUDIOCLIENT_PROCESS_LOOPBACK_PARAMS, PROCESS_LOOPBACK_MODE_EXCLUDE_TARGET_PROCESS_TREE,
    PROCESS_LOOPBACK_MODE_INCLUDE_TARGET_PROCESS_TREE, VIRTUAL_AUDIO_DEVICE_PROCESS_LOOPBACK,
};
use windows::Win32::System::Variant::VT_BLOB;
use windows_core::implement;

use process_loopback_core::{ActivationError, ActivationWaiter, PlatformError, SessionActivator, TargetProcess};

use crate::com::{platform_error, MtaUsage};
use crate::session::WasapiProcessSession;

/// Opens process-scoped loopback sessions (Windows 10 2004 / build 19041+).
#[derive(Debug, Default)]
pub struct ProcessLoopbackActivator;

impl ProcessLoopbackActivator {
    pub fn new() -> Self {
        Self
    }
}

impl SessionActivator for ProcessLoopbackActivator {
    type Session = WasapiProcessSession;

    fn activate(&mut self, target: &TargetProcess) -> Result<WasapiProcessSession, ActivationError> {
        let mta = MtaUsage::acquire().map_err(ActivationError::Request)?;
        let client = activate_audio_client(target)?;
        log::debug!(
            "Process loopback client activated for pid {} (include tree: {})",
            target.process_id,
            target.include_tree
        );
        Ok(WasapiProcessSession::new(client, mta))
    }
}

#[implement(IActivateAudioInterfaceCompletionHandler)]
struct CompletionHandler {
    waiter: ActivationWaiter,
}

impl IActivateAudioInterfaceCompletionHandler_Impl for CompletionHandler_Impl {
    fn ActivateCompleted(
        &self,
        _operation: windows_core::Ref<'_, IActivateAudioInterfaceAsyncOperation>,
    ) -> windows::core::Result<()> {
        self.waiter.complete(());
        Ok(())
    }
}

/// Request an `IAudioClient` bound to the target's process tree and block
/// until the activation completes.
fn activate_audio_client(target: &TargetProcess) -> Result<IAudioClient, ActivationError> {
    let waiter = ActivationWaiter::new();
    let handler: IActivateAudioInterfaceCompletionHandler = CompletionHandler {
        waiter: waiter.clone(),
    }
    .into();

    let mode = if target.include_tree {
        PROCESS_LOOPBACK_MODE_INCLUDE_TARGET_PROCESS_TREE
    } else {
        PROCESS_LOOPBACK_MODE_EXCLUDE_TARGET_PROCESS_TREE
    };
    let mut params = AUDIOCLIENT_ACTIVATION_PARAMS {
        ActivationType: AUDIOCLIENT_ACTIVATION_TYPE_PROCESS_LOOPBACK,
        Anonymous: AUDIOCLIENT_ACTIVATION_PARAMS_0 {
            ProcessLoopbackParams: AUDIOCLIENT_PROCESS_LOOPBACK_PARAMS {
                TargetProcessId: target.process_id,
                ProcessLoopbackMode: mode,
            },
        },
    };

    // VT_BLOB pointing at `params`; both stay on this frame until the call returns.
    let blob = windows_core::imp::PROPVARIANT {
        Anonymous: windows_core::imp::PROPVARIANT_0 {
            Anonymous: windows_core::imp::PROPVARIANT_0_0 {
                vt: VT_BLOB.0,
                wReserved1: 0,
                wReserved2: 0,
                wReserved3: 0,
                Anonymous: windows_core::imp::PROPVARIANT_0_0_0 {
                    blob: windows_core::imp::BLOB {
                        cbSize: std::mem::size_of::<AUDIOCLIENT_ACTIVATION_PARAMS>() as u32,
                        pBlobData: (&mut params as *mut AUDIOCLIENT_ACTIVATION_PARAMS).cast::<u8>(),
                    },
                },
            },
        },
    };
    let blob_ptr = (&blob as *const windows_core::imp::PROPVARIANT).cast::<windows_core::PROPVARIANT>();

    let operation = unsafe {
        ActivateAudioInterfaceAsync(
            VIRTUAL_AUDIO_DEVICE_PROCESS_LOOPBACK,
            &IAudioClient::IID,
            Some(blob_ptr),
            &handler,
        )
    }
    .map_err(|e| ActivationError::Request(platform_error(e)))?;

    waiter.wait();

    let mut status = HRESULT(0);
    let mut activated: Option<IUnknown> = None;
    unsafe { operation.GetActivateResult(&mut status, &mut activated) }
        .map_err(|e| ActivationError::Completion(platform_error(e)))?;
    status
        .ok()
        .map_err(|e| ActivationError::Completion(platform_error(e)))?;

    activated
        .ok_or_else(|| {
            ActivationError::Completion(PlatformError::new(
                E_NOINTERFACE.0,
                "activation returned no interface",
            ))
        })?
        .cast::<IAudioClient>()
        .map_err(|e| ActivationError::Completion(platform_error(e)))
}
