//! Expedited SDO server
//!
//! The server keeps no state between frames: each request is answered, or aborted, on its own.
use canstack_common::{
    constants::{object_ids, values},
    messages::NmtState,
    objects::DataWidth,
    sdo::{AbortCode, SdoRequest, SdoResponse},
};
use defmt_or_log::{debug, info};

use crate::hooks::SdoWriteHook;
use crate::object_dict::{find, ODEntry, ObjectKind};
use crate::persist;
use crate::storage::ParameterStorage;

/// Node context a request is served in
#[derive(Clone, Copy)]
#[allow(missing_debug_implementations)]
pub(crate) struct SdoContext<'a> {
    pub state: NmtState,
    pub storage: Option<&'a dyn ParameterStorage>,
    pub write_hook: Option<&'a dyn SdoWriteHook>,
}

/// Serve one request against `od`
pub(crate) fn handle_request(od: &[ODEntry], req: &SdoRequest, ctx: &SdoContext) -> SdoResponse {
    let (index, sub) = (req.index(), req.sub());
    let result = match find(od, index, sub) {
        None => Err(AbortCode::NoSuchObject),
        Some(entry) => match *req {
            SdoRequest::Read { .. } => read(entry, sub),
            SdoRequest::Write { data, .. } => write(od, entry, sub, &data, ctx),
            SdoRequest::Unknown { .. } => Err(AbortCode::InvalidCommandSpecifier),
        },
    };
    match result {
        Ok(resp) => resp,
        Err(code) => {
            debug!("SDO abort on 0x{:x}sub{}: {:x}", index, sub, code.raw());
            SdoResponse::abort(index, sub, code)
        }
    }
}

fn read(entry: &ODEntry, sub: u8) -> Result<SdoResponse, AbortCode> {
    if !entry.access.is_readable() {
        return Err(AbortCode::WriteOnly);
    }
    let (value, size) = match entry.kind {
        ObjectKind::Array(field) if sub == 0 => (field.max_len() as u32, 1),
        ObjectKind::Array(field) => (
            field.get(sub).ok_or(AbortCode::NoSuchObject)?,
            field.width().size(),
        ),
        ObjectKind::Scalar(field) => (field.load_u32(), field.width().size()),
    };
    Ok(SdoResponse::read_ok(
        entry.index,
        sub,
        &value.to_le_bytes()[..size],
    ))
}

fn write(
    od: &[ODEntry],
    entry: &ODEntry,
    sub: u8,
    data: &[u8; 4],
    ctx: &SdoContext,
) -> Result<SdoResponse, AbortCode> {
    if !entry.access.is_writable() {
        return Err(AbortCode::ReadOnly);
    }
    if ctx.state == NmtState::Bootup {
        return Err(AbortCode::CantStoreDeviceState);
    }

    match (entry.index, entry.kind) {
        (object_ids::STORE_PARAMETERS, _) => {
            let storage = ctx.storage.ok_or(AbortCode::CantStore)?;
            if *data != values::SAVE_CMD {
                return Err(AbortCode::CantStore);
            }
            persist::save(od, storage).map_err(|_| AbortCode::CantStore)?;
        }
        (object_ids::RESTORE_DEFAULT_PARAMETERS, _) => {
            let storage = ctx.storage.ok_or(AbortCode::CantStore)?;
            if *data != values::LOAD_CMD {
                return Err(AbortCode::CantStore);
            }
            storage.clear();
            info!("Stored parameters cleared");
        }
        (object_ids::ERROR_LOG, ObjectKind::Array(field)) if sub == 0 => field.clear()?,
        (_, ObjectKind::Array(field)) => {
            let value = le_value(data, field.width());
            field.set(sub, value)?;
        }
        (_, ObjectKind::Scalar(_)) => entry.write_scalar(data)?,
    }

    if let Some(hook) = ctx.write_hook {
        hook.on_sdo_write(entry.index, sub);
    }
    Ok(SdoResponse::WriteOk {
        index: entry.index,
        sub,
    })
}

fn le_value(data: &[u8; 4], width: DataWidth) -> u32 {
    u32::from_le_bytes(*data) & width.mask()
}
