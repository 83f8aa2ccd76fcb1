//! Thin helpers over the `hdf5` crate's group/dataset/attribute primitives.
//!
//! The binary container itself is treated as an external collaborator:
//! this module is the single place that calls into `hdf5` directly, so the
//! rest of the crate only ever sees typed group/entity/attribute values.

use hdf5::types::VarLenUnicode;
use hdf5::{Dataset, File as H5File, Group};
use log::trace;

use crate::error::{IoError, Result};

/// How the file was requested to be opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Read,
    ReadWrite,
    Append,
}

impl Mode {
    pub fn is_writable(&self) -> bool {
        !matches!(self, Mode::Read)
    }
}

/// Open or create the HDF5 container per the requested mode.
pub fn open_file(path: &std::path::Path, mode: Mode) -> Result<H5File> {
    trace!("opening {} in mode {:?}", path.display(), mode);
    let file = match mode {
        Mode::Read => H5File::open(path)?,
        Mode::ReadWrite => H5File::open_rw(path)?,
        Mode::Append => H5File::append(path)?,
    };
    Ok(file)
}

/// Fetch a child group by name if it exists.
pub fn group(parent: &Group, name: &str) -> Result<Option<Group>> {
    if parent.link_exists(name) {
        Ok(Some(parent.group(name)?))
    } else {
        Ok(None)
    }
}

/// Create a child group, failing if it already exists. The writer always
/// checks existence first, since HDF5 itself errors on a duplicate name.
pub fn create_group(parent: &Group, name: &str) -> Result<Group> {
    Ok(parent.create_group(name)?)
}

pub fn has_member(group: &Group, name: &str) -> bool {
    group.link_exists(name)
}

pub fn member_names(group: &Group) -> Result<Vec<String>> {
    Ok(group.member_names()?)
}

pub fn remove(parent: &Group, name: &str) -> Result<()> {
    if parent.link_exists(name) {
        parent.unlink(name)?;
    }
    Ok(())
}

pub fn link_soft(parent: &Group, target: &str, link_name: &str) -> Result<()> {
    parent.link_soft(target, link_name)?;
    Ok(())
}

/// Read a scalar string attribute (tolerant: returns `None` if absent).
pub fn read_attr_string(group: &Group, name: &str) -> Result<Option<String>> {
    if !group.attr_names()?.iter().any(|n| n == name) {
        return Ok(None);
    }
    let attr = group.attr(name)?;
    let value: VarLenUnicode = attr.read_scalar()?;
    Ok(Some(value.as_str().to_string()))
}

/// Require a string attribute, erroring with `Corrupt` semantics left to
/// the caller (which has the owning uid for context).
pub fn require_attr_string(group: &Group, name: &str) -> Result<String> {
    read_attr_string(group, name)?.ok_or_else(|| {
        IoError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("missing required attribute {name}"),
        ))
    })
}

pub fn write_attr_string(group: &Group, name: &str, value: &str) -> Result<()> {
    let data: VarLenUnicode = value.parse().unwrap_or_default();
    if group.attr_names()?.iter().any(|n| n == name) {
        group.attr(name)?.write_scalar(&data)?;
    } else {
        group.new_attr::<VarLenUnicode>().create(name)?.write_scalar(&data)?;
    }
    Ok(())
}

pub fn read_attr_f64(group: &Group, name: &str) -> Result<Option<f64>> {
    if !group.attr_names()?.iter().any(|n| n == name) {
        return Ok(None);
    }
    Ok(Some(group.attr(name)?.read_scalar::<f64>()?))
}

pub fn write_attr_f64(group: &Group, name: &str, value: f64) -> Result<()> {
    if group.attr_names()?.iter().any(|n| n == name) {
        group.attr(name)?.write_scalar(&value)?;
    } else {
        group.new_attr::<f64>().create(name)?.write_scalar(&value)?;
    }
    Ok(())
}

pub fn read_attr_i8(group: &Group, name: &str) -> Result<Option<i8>> {
    if !group.attr_names()?.iter().any(|n| n == name) {
        return Ok(None);
    }
    Ok(Some(group.attr(name)?.read_scalar::<i8>()?))
}

pub fn write_attr_i8(group: &Group, name: &str, value: i8) -> Result<()> {
    if group.attr_names()?.iter().any(|n| n == name) {
        group.attr(name)?.write_scalar(&value)?;
    } else {
        group.new_attr::<i8>().create(name)?.write_scalar(&value)?;
    }
    Ok(())
}

pub fn read_attr_string_array(group: &Group, name: &str) -> Result<Option<Vec<String>>> {
    if !group.attr_names()?.iter().any(|n| n == name) {
        return Ok(None);
    }
    let attr = group.attr(name)?;
    let values = attr.read_1d::<VarLenUnicode>()?;
    Ok(Some(values.iter().map(|v| v.as_str().to_string()).collect()))
}

pub fn write_attr_string_array(group: &Group, name: &str, values: &[String]) -> Result<()> {
    let data: Vec<VarLenUnicode> = values
        .iter()
        .map(|s| s.parse().unwrap_or_default())
        .collect();
    if group.attr_names()?.iter().any(|n| n == name) {
        group.unlink(name).ok();
    }
    group
        .new_attr_builder()
        .with_data(&data)
        .create(name)?;
    Ok(())
}

pub fn read_dataset_f64(group: &Group, name: &str) -> Result<Vec<f64>> {
    let ds: Dataset = group.dataset(name)?;
    Ok(ds.read_1d::<f64>()?.to_vec())
}

pub fn write_dataset_f64(group: &Group, name: &str, values: &[f64]) -> Result<()> {
    if has_member(group, name) {
        remove(group, name)?;
    }
    group
        .new_dataset_builder()
        .with_data(values)
        .create(name)?;
    Ok(())
}

pub fn read_dataset_i32(group: &Group, name: &str) -> Result<Vec<i32>> {
    let ds: Dataset = group.dataset(name)?;
    Ok(ds.read_1d::<i32>()?.to_vec())
}

pub fn write_dataset_i32(group: &Group, name: &str, values: &[i32]) -> Result<()> {
    if has_member(group, name) {
        remove(group, name)?;
    }
    group
        .new_dataset_builder()
        .with_data(values)
        .create(name)?;
    Ok(())
}

pub fn read_dataset_u32(group: &Group, name: &str) -> Result<Vec<u32>> {
    let ds: Dataset = group.dataset(name)?;
    Ok(ds.read_1d::<u32>()?.to_vec())
}

pub fn write_dataset_u32(group: &Group, name: &str, values: &[u32]) -> Result<()> {
    if has_member(group, name) {
        remove(group, name)?;
    }
    group
        .new_dataset_builder()
        .with_data(values)
        .create(name)?;
    Ok(())
}

pub fn read_dataset_f32(group: &Group, name: &str) -> Result<Vec<f32>> {
    let ds: Dataset = group.dataset(name)?;
    Ok(ds.read_1d::<f32>()?.to_vec())
}

pub fn write_dataset_f32(group: &Group, name: &str, values: &[f32]) -> Result<()> {
    if has_member(group, name) {
        remove(group, name)?;
    }
    group
        .new_dataset_builder()
        .with_data(values)
        .create(name)?;
    Ok(())
}

pub fn read_dataset_i8(group: &Group, name: &str) -> Result<Vec<i8>> {
    let ds: Dataset = group.dataset(name)?;
    Ok(ds.read_1d::<i8>()?.to_vec())
}

pub fn write_dataset_i8(group: &Group, name: &str, values: &[i8]) -> Result<()> {
    if has_member(group, name) {
        remove(group, name)?;
    }
    group
        .new_dataset_builder()
        .with_data(values)
        .create(name)?;
    Ok(())
}

pub fn read_dataset_strings(group: &Group, name: &str) -> Result<Vec<String>> {
    let ds: Dataset = group.dataset(name)?;
    let values = ds.read_1d::<VarLenUnicode>()?;
    Ok(values.iter().map(|v| v.as_str().to_string()).collect())
}

pub fn write_dataset_strings(group: &Group, name: &str, values: &[String]) -> Result<()> {
    let data: Vec<VarLenUnicode> = values
        .iter()
        .map(|s| s.parse().unwrap_or_default())
        .collect();
    if has_member(group, name) {
        remove(group, name)?;
    }
    group
        .new_dataset_builder()
        .with_data(&data)
        .create(name)?;
    Ok(())
}

/// Compound row of the reference value map dataset:
/// `{ Key: u32, Value: UTF-8 string }`.
#[derive(Debug, Clone, hdf5::H5Type)]
#[repr(C)]
pub struct ValueMapRow {
    pub key: u32,
    pub value: VarLenUnicode,
}

pub fn read_value_map(group: &Group, name: &str) -> Result<Vec<(u32, String)>> {
    let ds: Dataset = group.dataset(name)?;
    let rows = ds.read_1d::<ValueMapRow>()?;
    Ok(rows
        .iter()
        .map(|row| (row.key, row.value.as_str().to_string()))
        .collect())
}

pub fn write_value_map(group: &Group, name: &str, entries: &[(u32, String)]) -> Result<()> {
    let rows: Vec<ValueMapRow> = entries
        .iter()
        .map(|(key, value)| ValueMapRow {
            key: *key,
            value: value.parse().unwrap_or_default(),
        })
        .collect();
    group
        .new_dataset_builder()
        .with_data(&rows)
        .create(name)?;
    Ok(())
}

/// Compound row of a data type's color map dataset:
/// bin value paired with an RGBA color, not interpreted by this crate
/// and carried through read/write untouched.
#[derive(Debug, Clone, hdf5::H5Type)]
#[repr(C)]
pub struct ColorMapRow {
    pub value: f64,
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub alpha: u8,
}

pub fn read_color_map(group: &Group, name: &str) -> Result<Vec<(f64, [u8; 4])>> {
    let ds: Dataset = group.dataset(name)?;
    let rows = ds.read_1d::<ColorMapRow>()?;
    Ok(rows
        .iter()
        .map(|row| (row.value, [row.red, row.green, row.blue, row.alpha]))
        .collect())
}

pub fn write_color_map(group: &Group, name: &str, entries: &[(f64, [u8; 4])]) -> Result<()> {
    let rows: Vec<ColorMapRow> = entries
        .iter()
        .map(|(value, rgba)| ColorMapRow {
            value: *value,
            red: rgba[0],
            green: rgba[1],
            blue: rgba[2],
            alpha: rgba[3],
        })
        .collect();
    if has_member(group, name) {
        remove(group, name)?;
    }
    group
        .new_dataset_builder()
        .with_data(&rows)
        .create(name)?;
    Ok(())
}

/// One row of a concatenator's slice index: which object's
/// channel lives at `[start, start+length)` in that channel's shared array.
#[derive(Debug, Clone, hdf5::H5Type)]
#[repr(C)]
pub struct ConcatSliceRow {
    pub object_id: VarLenUnicode,
    pub channel: VarLenUnicode,
    pub start: u64,
    pub length: u64,
}

pub fn read_concat_slices(group: &Group, name: &str) -> Result<Vec<(String, String, u64, u64)>> {
    let ds: Dataset = group.dataset(name)?;
    let rows = ds.read_1d::<ConcatSliceRow>()?;
    Ok(rows
        .iter()
        .map(|r| (r.object_id.as_str().to_string(), r.channel.as_str().to_string(), r.start, r.length))
        .collect())
}

pub fn write_concat_slices(group: &Group, name: &str, rows: &[(String, String, u64, u64)]) -> Result<()> {
    let data: Vec<ConcatSliceRow> = rows
        .iter()
        .map(|(object_id, channel, start, length)| ConcatSliceRow {
            object_id: object_id.parse().unwrap_or_default(),
            channel: channel.parse().unwrap_or_default(),
            start: *start,
            length: *length,
        })
        .collect();
    if has_member(group, name) {
        remove(group, name)?;
    }
    group
        .new_dataset_builder()
        .with_data(&data)
        .create(name)?;
    Ok(())
}
