//! WMI instrumentation source: `__InstanceCreationEvent` /
//! `__InstanceDeletionEvent` for `Win32_Process`, delivered to an
//! `IWbemObjectSink` on WMI's own threads.

use super::{BatchSink, EventSource, InstanceEvent, Subscription};
use crate::error::{Error, Result};
use crate::os::os_error;
use tracing::{debug, warn};
use windows::core::{implement, w, ComInterface, Error as WinError, IUnknown, Result as WinResult, BSTR, HRESULT, PCWSTR};
use windows::Win32::Foundation::{E_POINTER, E_UNEXPECTED, RPC_E_CHANGED_MODE};
use windows::Win32::System::Com::{
    CoCreateInstance, CoInitializeEx, CoSetProxyBlanket, CLSCTX_INPROC_SERVER, COINIT_MULTITHREADED, EOAC_NONE,
    RPC_C_AUTHN_LEVEL_CALL, RPC_C_IMP_LEVEL_IMPERSONATE,
};
use windows::Win32::System::Rpc::{RPC_C_AUTHN_WINNT, RPC_C_AUTHZ_NONE};
use windows::Win32::System::Variant::{VariantClear, VARIANT, VT_BSTR, VT_I4, VT_UI4, VT_UNKNOWN};
use windows::Win32::System::Wmi::{
    IWbemClassObject, IWbemLocator, IWbemObjectSink, IWbemObjectSink_Impl, IWbemServices, WbemLocator,
    WBEM_FLAG_SEND_STATUS, WBEM_STATUS_COMPLETE,
};

const NAMESPACE: &str = "ROOT\\CIMV2";
const QUERY: &str = "SELECT * FROM __InstanceOperationEvent WITHIN 1 \
    WHERE (__CLASS = '__InstanceCreationEvent' OR __CLASS = '__InstanceDeletionEvent') \
    AND TargetInstance ISA 'Win32_Process'";

/// Connects to the local WMI service when subscribed.
#[derive(Debug, Default, Clone, Copy)]
pub struct WmiEventSource;

impl WmiEventSource {
    pub fn new() -> Self {
        Self
    }
}

impl EventSource for WmiEventSource {
    fn subscribe(self, sink: BatchSink) -> Result<Box<dyn Subscription>> {
        let subscription = connect(sink).map_err(|e| Error::Subscription(os_error("WMI subscribe", e)))?;
        debug!(namespace = NAMESPACE, "WMI notification query registered");
        Ok(Box::new(subscription))
    }
}

fn connect(sink: BatchSink) -> WinResult<WmiSubscription> {
    unsafe {
        match CoInitializeEx(None, COINIT_MULTITHREADED) {
            Ok(()) => {}
            Err(e) if e.code() == RPC_E_CHANGED_MODE => {}
            Err(e) => return Err(e),
        }

        let locator: IWbemLocator = CoCreateInstance(&WbemLocator, None, CLSCTX_INPROC_SERVER)?;
        let services = locator.ConnectServer(
            &BSTR::from(NAMESPACE),
            &BSTR::new(),
            &BSTR::new(),
            &BSTR::new(),
            0,
            &BSTR::new(),
            None,
        )?;
        CoSetProxyBlanket(
            &services,
            RPC_C_AUTHN_WINNT,
            RPC_C_AUTHZ_NONE,
            None,
            RPC_C_AUTHN_LEVEL_CALL,
            RPC_C_IMP_LEVEL_IMPERSONATE,
            None,
            EOAC_NONE,
        )?;

        let sink: IWbemObjectSink = EventSink { deliver: sink }.into();
        services.ExecNotificationQueryAsync(
            &BSTR::from("WQL"),
            &BSTR::from(QUERY),
            WBEM_FLAG_SEND_STATUS,
            None,
            &sink,
        )?;
        Ok(WmiSubscription {
            services,
            sink: Some(sink),
        })
    }
}

struct WmiSubscription {
    services: IWbemServices,
    sink: Option<IWbemObjectSink>,
}

impl Subscription for WmiSubscription {
    fn cancel(&mut self) {
        if let Some(sink) = self.sink.take() {
            if let Err(e) = unsafe { self.services.CancelAsyncCall(&sink) } {
                warn!(error = %e, "CancelAsyncCall failed");
            }
        }
    }
}

impl Drop for WmiSubscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[implement(IWbemObjectSink)]
struct EventSink {
    deliver: BatchSink,
}

impl IWbemObjectSink_Impl for EventSink {
    fn Indicate(&self, count: i32, objects: *const Option<IWbemClassObject>) -> WinResult<()> {
        let objects = if objects.is_null() || count <= 0 {
            &[][..]
        } else {
            unsafe { std::slice::from_raw_parts(objects, count as usize) }
        };

        let mut batch = Vec::with_capacity(objects.len());
        for object in objects.iter().flatten() {
            match read_event(object) {
                Ok(event) => batch.push(event),
                Err(e) => warn!(error = %e, "unreadable WMI event record"),
            }
        }
        (self.deliver)(batch);
        Ok(())
    }

    fn SetStatus(
        &self,
        flags: i32,
        result: HRESULT,
        _param: &BSTR,
        _object: Option<&IWbemClassObject>,
    ) -> WinResult<()> {
        if flags == WBEM_STATUS_COMPLETE.0 && result.is_err() {
            warn!(code = format_args!("{:#010x}", result.0), "WMI notification query ended");
        }
        Ok(())
    }
}

fn read_event(event: &IWbemClassObject) -> WinResult<InstanceEvent> {
    let class_name = Property::get(event, w!("__CLASS"))?.string()?;
    let target = Property::get(event, w!("TargetInstance"))?.object()?;
    let pid = Property::get(&target, w!("ProcessId"))?.u32()?;
    let name = Property::get(&target, w!("Name"))?.string()?;
    Ok(InstanceEvent { class_name, pid, name })
}

/// A VARIANT read from a WMI object, cleared on drop.
struct Property(VARIANT);

impl Drop for Property {
    fn drop(&mut self) {
        unsafe {
            let _ = VariantClear(&mut self.0);
        }
    }
}

impl Property {
    fn get(object: &IWbemClassObject, name: PCWSTR) -> WinResult<Self> {
        let mut value = Property(VARIANT::default());
        unsafe { object.Get(name, 0, &mut value.0, None, None)? };
        Ok(value)
    }

    fn string(&self) -> WinResult<String> {
        unsafe {
            let inner = &self.0.Anonymous.Anonymous;
            if inner.vt != VT_BSTR {
                return Err(WinError::from(E_UNEXPECTED));
            }
            Ok(inner.Anonymous.bstrVal.to_string())
        }
    }

    fn u32(&self) -> WinResult<u32> {
        unsafe {
            let inner = &self.0.Anonymous.Anonymous;
            match inner.vt {
                VT_I4 => Ok(inner.Anonymous.lVal as u32),
                VT_UI4 => Ok(inner.Anonymous.ulVal),
                _ => Err(WinError::from(E_UNEXPECTED)),
            }
        }
    }

    fn object(&self) -> WinResult<IWbemClassObject> {
        unsafe {
            let inner = &self.0.Anonymous.Anonymous;
            if inner.vt != VT_UNKNOWN {
                return Err(WinError::from(E_UNEXPECTED));
            }
            let unknown: &Option<IUnknown> = &inner.Anonymous.punkVal;
            unknown.as_ref().ok_or_else(|| WinError::from(E_POINTER))?.cast()
        }
    }
}
