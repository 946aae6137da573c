//! ALSA control backend.
//!
//! Card discovery goes through the `alsa` crate; element access uses the
//! control API from `alsa-sys` directly, since the safe wrapper does not
//! expose ranges, enumerated item names, access flags or TLV reads. Every
//! allocation is owned by a guard that frees it on drop, and [`CtlHandle`]
//! closes the control connection on drop.

use alsa_sys as sys;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_uint};
use std::ptr;
use tracing::debug;

use super::{BackendError, ControlBackend, DeviceHandle};
use crate::element::{
    Access, Bounds, CardInfo, ControlValue, ElementInfo, ElementType, Iec958Status, Iface, Scalar,
};

/// TLV read buffer size in words.
const TLV_WORDS: usize = 4096;

fn strerror(code: c_int) -> String {
    cstr(unsafe { sys::snd_strerror(code) })
}

fn cstr(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

fn check(op: &'static str, code: c_int) -> Result<c_int, BackendError> {
    if code < 0 {
        Err(BackendError::io(op, format!("{} ({code})", strerror(code))))
    } else {
        Ok(code)
    }
}

macro_rules! alsa_guard {
    ($name:ident, $raw:ty, $malloc:path, $free:path, $op:literal) => {
        struct $name(*mut $raw);

        impl $name {
            fn new() -> Result<Self, BackendError> {
                let mut raw = ptr::null_mut();
                check($op, unsafe { $malloc(&mut raw) })?;
                Ok(Self(raw))
            }
        }

        impl Drop for $name {
            fn drop(&mut self) {
                unsafe { $free(self.0) }
            }
        }
    };
}

alsa_guard!(
    CardInfoGuard,
    sys::snd_ctl_card_info_t,
    sys::snd_ctl_card_info_malloc,
    sys::snd_ctl_card_info_free,
    "card info alloc"
);
alsa_guard!(
    ElemListGuard,
    sys::snd_ctl_elem_list_t,
    sys::snd_ctl_elem_list_malloc,
    sys::snd_ctl_elem_list_free,
    "element list alloc"
);
alsa_guard!(
    ElemInfoGuard,
    sys::snd_ctl_elem_info_t,
    sys::snd_ctl_elem_info_malloc,
    sys::snd_ctl_elem_info_free,
    "element info alloc"
);
alsa_guard!(
    ElemValueGuard,
    sys::snd_ctl_elem_value_t,
    sys::snd_ctl_elem_value_malloc,
    sys::snd_ctl_elem_value_free,
    "element value alloc"
);
alsa_guard!(
    ElemIdGuard,
    sys::snd_ctl_elem_id_t,
    sys::snd_ctl_elem_id_malloc,
    sys::snd_ctl_elem_id_free,
    "element id alloc"
);

/// Opens `hw:N` style control devices through alsa-lib.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlsaBackend;

impl ControlBackend for AlsaBackend {
    type Handle = CtlHandle;

    fn open(&self, device_id: &str) -> Result<CtlHandle, BackendError> {
        let name =
            CString::new(device_id).map_err(|_| BackendError::NoDevice(device_id.to_string()))?;
        let mut ctl = ptr::null_mut();
        let rc = unsafe { sys::snd_ctl_open(&mut ctl, name.as_ptr(), 0) };
        if rc == -libc::ENOENT || rc == -libc::ENODEV || rc == -libc::EINVAL {
            return Err(BackendError::NoDevice(device_id.to_string()));
        }
        check("control open", rc)?;

        debug!(device_id, "control device opened");
        Ok(CtlHandle {
            ctl,
            device_id: device_id.to_string(),
        })
    }

    fn device_ids(&self, max_cards: u32) -> Vec<String> {
        ::alsa::card::Iter::new()
            .filter_map(Result::ok)
            .map(|card| card.get_index())
            .filter(|idx| *idx >= 0 && (*idx as u32) < max_cards)
            .map(|idx| format!("hw:{idx}"))
            .collect()
    }
}

/// Open control connection; closed on drop.
pub struct CtlHandle {
    ctl: *mut sys::snd_ctl_t,
    device_id: String,
}

impl CtlHandle {
    fn read_raw(&self, numid: u32) -> Result<ElemValueGuard, BackendError> {
        let value = ElemValueGuard::new()?;
        unsafe { sys::snd_ctl_elem_value_set_numid(value.0, numid as c_uint) };
        check("element read", unsafe {
            sys::snd_ctl_elem_read(self.ctl, value.0)
        })?;
        Ok(value)
    }

    fn item_names(&self, info: &ElemInfoGuard) -> Result<Vec<String>, BackendError> {
        let items = unsafe { sys::snd_ctl_elem_info_get_items(info.0) };
        let mut names = Vec::with_capacity(items as usize);
        for item in 0..items {
            unsafe { sys::snd_ctl_elem_info_set_item(info.0, item) };
            check("element item info", unsafe {
                sys::snd_ctl_elem_info(self.ctl, info.0)
            })?;
            names.push(cstr(unsafe { sys::snd_ctl_elem_info_get_item_name(info.0) }));
        }
        Ok(names)
    }
}

impl DeviceHandle for CtlHandle {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn card_info(&self) -> Result<CardInfo, BackendError> {
        let info = CardInfoGuard::new()?;
        check("card info", unsafe {
            sys::snd_ctl_card_info(self.ctl, info.0)
        })?;
        Ok(CardInfo {
            id: cstr(unsafe { sys::snd_ctl_card_info_get_id(info.0) }),
            name: cstr(unsafe { sys::snd_ctl_card_info_get_name(info.0) }),
            driver: cstr(unsafe { sys::snd_ctl_card_info_get_driver(info.0) }),
            long_name: cstr(unsafe { sys::snd_ctl_card_info_get_longname(info.0) }),
        })
    }

    fn numids(&self) -> Result<Vec<u32>, BackendError> {
        let list = ElemListGuard::new()?;
        check("element list", unsafe {
            sys::snd_ctl_elem_list(self.ctl, list.0)
        })?;
        let count = unsafe { sys::snd_ctl_elem_list_get_count(list.0) };
        check("element list alloc", unsafe {
            sys::snd_ctl_elem_list_alloc_space(list.0, count)
        })?;

        let rc = unsafe { sys::snd_ctl_elem_list(self.ctl, list.0) };
        let numids = if rc < 0 {
            Vec::new()
        } else {
            let used = unsafe { sys::snd_ctl_elem_list_get_used(list.0) };
            (0..used)
                .map(|idx| unsafe { sys::snd_ctl_elem_list_get_numid(list.0, idx) } as u32)
                .collect()
        };
        unsafe { sys::snd_ctl_elem_list_free_space(list.0) };
        check("element list", rc)?;

        Ok(numids)
    }

    fn info(&self, numid: u32) -> Result<ElementInfo, BackendError> {
        let info = ElemInfoGuard::new()?;
        unsafe { sys::snd_ctl_elem_info_set_numid(info.0, numid as c_uint) };
        let rc = unsafe { sys::snd_ctl_elem_info(self.ctl, info.0) };
        if rc == -libc::ENOENT {
            return Err(BackendError::NoElement(numid));
        }
        check("element info", rc)?;

        let kind = ElementType::from_raw(unsafe { sys::snd_ctl_elem_info_get_type(info.0) } as u32);
        let flag = |v: c_int| v != 0;
        let access = unsafe {
            Access {
                readable: flag(sys::snd_ctl_elem_info_is_readable(info.0)),
                writable: flag(sys::snd_ctl_elem_info_is_writable(info.0)),
                inactive: flag(sys::snd_ctl_elem_info_is_inactive(info.0)),
                volatile: flag(sys::snd_ctl_elem_info_is_volatile(info.0)),
                locked: flag(sys::snd_ctl_elem_info_is_locked(info.0)),
                tlv_read: flag(sys::snd_ctl_elem_info_is_tlv_readable(info.0)),
                tlv_write: flag(sys::snd_ctl_elem_info_is_tlv_writable(info.0)),
                tlv_command: flag(sys::snd_ctl_elem_info_is_tlv_commandable(info.0)),
            }
        };

        let bounds = match kind {
            ElementType::Integer => unsafe {
                Bounds::Integer {
                    min: sys::snd_ctl_elem_info_get_min(info.0) as i64,
                    max: sys::snd_ctl_elem_info_get_max(info.0) as i64,
                    step: sys::snd_ctl_elem_info_get_step(info.0) as i64,
                }
            },
            ElementType::Integer64 => unsafe {
                Bounds::Integer {
                    min: sys::snd_ctl_elem_info_get_min64(info.0) as i64,
                    max: sys::snd_ctl_elem_info_get_max64(info.0) as i64,
                    step: sys::snd_ctl_elem_info_get_step64(info.0) as i64,
                }
            },
            ElementType::Enumerated => Bounds::Enumerated(self.item_names(&info)?),
            _ => Bounds::None,
        };

        Ok(ElementInfo {
            numid,
            name: cstr(unsafe { sys::snd_ctl_elem_info_get_name(info.0) }),
            iface: Iface::from_raw(unsafe { sys::snd_ctl_elem_info_get_interface(info.0) } as u32),
            kind,
            count: unsafe { sys::snd_ctl_elem_info_get_count(info.0) } as u32,
            access,
            bounds,
        })
    }

    fn read(&self, info: &ElementInfo) -> Result<ControlValue, BackendError> {
        let value = self.read_raw(info.numid)?;
        let raw = value.0;

        let mut out = Vec::with_capacity(info.count());
        for idx in 0..info.count as c_uint {
            let scalar = unsafe {
                match info.kind {
                    ElementType::Boolean => {
                        Scalar::Bool(sys::snd_ctl_elem_value_get_boolean(raw, idx) != 0)
                    }
                    ElementType::Integer => {
                        Scalar::Int(sys::snd_ctl_elem_value_get_integer(raw, idx) as i64)
                    }
                    ElementType::Integer64 => {
                        Scalar::Int(sys::snd_ctl_elem_value_get_integer64(raw, idx) as i64)
                    }
                    ElementType::Enumerated => {
                        Scalar::Int(sys::snd_ctl_elem_value_get_enumerated(raw, idx) as i64)
                    }
                    ElementType::Bytes => {
                        Scalar::Int(sys::snd_ctl_elem_value_get_byte(raw, idx) as i64)
                    }
                    ElementType::Iec958 => {
                        let mut aes: sys::snd_aes_iec958_t = std::mem::zeroed();
                        sys::snd_ctl_elem_value_get_iec958(raw, &mut aes);
                        Scalar::Iec958(Iec958Status {
                            aes0: aes.status[0],
                            aes1: aes.status[1],
                            aes2: aes.status[2],
                            aes3: aes.status[3],
                        })
                    }
                    ElementType::None => Scalar::Unknown,
                }
            };
            out.push(scalar);
        }
        Ok(out)
    }

    fn write(&self, info: &ElementInfo, value: &ControlValue) -> Result<(), BackendError> {
        // IEC958 carries more than the four status bytes we expose, so start
        // from the current hardware value.
        let guard = if info.kind == ElementType::Iec958 {
            self.read_raw(info.numid)?
        } else {
            let guard = ElemValueGuard::new()?;
            unsafe { sys::snd_ctl_elem_value_set_numid(guard.0, info.numid as c_uint) };
            guard
        };
        let raw = guard.0;

        for (idx, scalar) in value.iter().enumerate().take(info.count()) {
            let idx = idx as c_uint;
            unsafe {
                match (info.kind, scalar) {
                    (ElementType::Boolean, s) => {
                        let on = s.as_bool().unwrap_or(false);
                        sys::snd_ctl_elem_value_set_boolean(raw, idx, on as _);
                    }
                    (ElementType::Integer, Scalar::Int(v)) => {
                        sys::snd_ctl_elem_value_set_integer(raw, idx, *v as _);
                    }
                    (ElementType::Integer64, Scalar::Int(v)) => {
                        sys::snd_ctl_elem_value_set_integer64(raw, idx, *v as _);
                    }
                    (ElementType::Enumerated, Scalar::Int(v)) => {
                        sys::snd_ctl_elem_value_set_enumerated(raw, idx, *v as _);
                    }
                    (ElementType::Bytes, Scalar::Int(v)) => {
                        sys::snd_ctl_elem_value_set_byte(raw, idx, *v as _);
                    }
                    (ElementType::Iec958, Scalar::Iec958(status)) => {
                        let mut aes: sys::snd_aes_iec958_t = std::mem::zeroed();
                        sys::snd_ctl_elem_value_get_iec958(raw, &mut aes);
                        aes.status[0] = status.aes0;
                        aes.status[1] = status.aes1;
                        aes.status[2] = status.aes2;
                        aes.status[3] = status.aes3;
                        sys::snd_ctl_elem_value_set_iec958(raw, &aes);
                    }
                    (kind, other) => {
                        return Err(BackendError::io(
                            "element write",
                            format!("cannot store {other:?} in a {kind} control"),
                        ));
                    }
                }
            }
        }

        check("element write", unsafe {
            sys::snd_ctl_elem_write(self.ctl, raw)
        })?;
        Ok(())
    }

    fn read_tlv(&self, info: &ElementInfo) -> Result<Vec<u32>, BackendError> {
        let id = ElemIdGuard::new()?;
        unsafe { sys::snd_ctl_elem_id_set_numid(id.0, info.numid as c_uint) };

        let mut words = vec![0u32; TLV_WORDS];
        check("TLV read", unsafe {
            sys::snd_ctl_elem_tlv_read(
                self.ctl,
                id.0,
                words.as_mut_ptr() as *mut c_uint,
                (TLV_WORDS * 4) as c_uint,
            )
        })?;

        // Keep exactly what the header claims so oversized records still
        // surface as size errors in the decoder.
        let claimed = 2 + (words[1] as usize).div_ceil(4);
        words.truncate(claimed.min(TLV_WORDS));
        Ok(words)
    }
}

impl Drop for CtlHandle {
    fn drop(&mut self) {
        unsafe { sys::snd_ctl_close(self.ctl) };
        debug!(device_id = %self.device_id, "control device closed");
    }
}
