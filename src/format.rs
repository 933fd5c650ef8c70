//! Object Formats
//!
//! Per-kind descriptors the MPM invokes on any block belonging to a pool
//! (`spec.md` §4.2). Both formats share the same shape: `scan` walks a
//! `[base, limit)` range one block at a time, skipping anything that
//! carries a forward or pad marker, and fixing every reference field of
//! anything live.

use crate::error::Result;
use crate::forwarding::{
    poison_tail, read_forward_marker, read_pad_marker, write_forward_marker, write_pad_marker,
};
use crate::mpm::{FormatDesc, ScanState};
use crate::tag;
use crate::value::{Cons, Symbol, SymbolRedirect, TaggedRef};
use std::mem::size_of;

const CONS_SIZE: usize = size_of::<Cons>();
const SYMBOL_SIZE: usize = size_of::<Symbol>();

/// Build the object format bound to `cons_pool`.
pub fn cons_format() -> FormatDesc {
    FormatDesc {
        alignment: std::mem::align_of::<Cons>(),
        object_size: CONS_SIZE,
        scan: cons_scan,
        skip: cons_skip,
        forward: cons_forward,
        is_forwarded: cons_is_forwarded,
        pad: cons_pad,
    }
}

/// Build the object format bound to `symbol_pool`.
pub fn symbol_format() -> FormatDesc {
    FormatDesc {
        alignment: std::mem::align_of::<Symbol>(),
        object_size: SYMBOL_SIZE,
        scan: symbol_scan,
        skip: symbol_skip,
        forward: symbol_forward,
        is_forwarded: symbol_is_forwarded,
        pad: symbol_pad,
    }
}

fn cons_scan(ss: &mut dyn ScanState, base: usize, limit: usize) -> Result<()> {
    let mut addr = base;
    while addr + CONS_SIZE <= limit {
        if unsafe { read_forward_marker(addr) }.is_some() || unsafe { read_pad_marker(addr) }.is_some() {
            addr = cons_skip(addr);
            continue;
        }
        let cell = addr as *mut Cons;
        unsafe {
            let mut car = (*cell).car;
            let mut cdr = (*cell).cdr;
            tag::fix(ss, &mut car)?;
            tag::fix(ss, &mut cdr)?;
            (*cell).car = car;
            (*cell).cdr = cdr;
        }
        addr = cons_skip(addr);
    }
    Ok(())
}

fn cons_skip(addr: usize) -> usize {
    addr + CONS_SIZE
}

fn cons_forward(old: usize, new: usize) {
    unsafe { write_forward_marker(old, new) };
}

fn cons_is_forwarded(addr: usize) -> Option<usize> {
    unsafe { read_forward_marker(addr) }
}

fn cons_pad(addr: usize, size: usize) {
    unsafe {
        write_pad_marker(addr, size);
        poison_tail(addr, size, std::mem::size_of::<u64>() * 2);
    }
}

fn symbol_scan(ss: &mut dyn ScanState, base: usize, limit: usize) -> Result<()> {
    let mut addr = base;
    while addr + SYMBOL_SIZE <= limit {
        if unsafe { read_forward_marker(addr) }.is_some() || unsafe { read_pad_marker(addr) }.is_some() {
            addr = symbol_skip(addr);
            continue;
        }
        let sym = addr as *mut Symbol;
        unsafe {
            let mut name = (*sym).name;
            tag::fix(ss, &mut name)?;
            (*sym).name = name;

            // Only a plain value slot holds a direct reference; the other
            // redirect kinds are handled by the legacy mark phase
            // (`spec.md` §4.2).
            if (*sym).redirect == SymbolRedirect::PlainVal {
                let mut value = (*sym).value;
                let mut function = (*sym).function;
                let mut plist = (*sym).plist;
                let mut package = (*sym).package;
                tag::fix(ss, &mut value)?;
                tag::fix(ss, &mut function)?;
                tag::fix(ss, &mut plist)?;
                tag::fix(ss, &mut package)?;
                (*sym).value = value;
                (*sym).function = function;
                (*sym).plist = plist;
                (*sym).package = package;
            }
        }
        addr = symbol_skip(addr);
    }
    Ok(())
}

fn symbol_skip(addr: usize) -> usize {
    addr + SYMBOL_SIZE
}

fn symbol_forward(old: usize, new: usize) {
    unsafe { write_forward_marker(old, new) };
}

fn symbol_is_forwarded(addr: usize) -> Option<usize> {
    unsafe { read_forward_marker(addr) }
}

fn symbol_pad(addr: usize, size: usize) {
    unsafe {
        write_pad_marker(addr, size);
        poison_tail(addr, size, std::mem::size_of::<u64>() * 2);
    }
}

/// Read the two reference fields of a live cons cell at `addr`, bypassing
/// `fix`. Used by the legacy-mark bridge (`spec.md` §4.9), which inspects
/// pool contents directly rather than through the scan/fix protocol.
///
/// # Safety
/// `addr` must be the address of a live, non-forwarded, non-padding cons
/// block.
pub unsafe fn read_cons_refs(addr: usize) -> [TaggedRef; 2] {
    let cell = &*(addr as *const Cons);
    [cell.car, cell.cdr]
}

/// Read the reference-bearing fields of a live, `PLAINVAL` symbol at
/// `addr`, bypassing `fix`. Used by the legacy-mark bridge.
///
/// # Safety
/// `addr` must be the address of a live, non-forwarded, non-padding symbol
/// block.
pub unsafe fn read_symbol_refs(addr: usize) -> Vec<TaggedRef> {
    let sym = &*(addr as *const Symbol);
    if sym.redirect == SymbolRedirect::PlainVal {
        vec![sym.name, sym.value, sym.function, sym.plist, sym.package]
    } else {
        vec![sym.name]
    }
}
