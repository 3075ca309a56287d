//! Runtime memory: global variable slots, class layouts, the label tables
//! that map signatures to generated procedures, and the instance heap.
//!
//! The heap is append-only. Nothing is ever reclaimed; slot 0 is the null
//! sentinel so that address 0 always means `None`.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::value::Value;
use crate::error::{Error, ErrorKind, Result};
use crate::types::Type;

/// Memory operations generated code calls back into.
pub trait HostOps {
    /// Allocates an instance of the class with `type_code` and returns its
    /// address.
    fn instantiate(&mut self, type_code: i32) -> Result<i32>;
    fn attribute_get(&mut self, address: i32, index: i32) -> Result<i32>;
    fn attribute_set(&mut self, address: i32, index: i32, word: i32) -> Result<()>;
    fn global_get(&mut self, slot: i32) -> Result<i32>;
    fn global_set(&mut self, slot: i32, word: i32) -> Result<()>;
    /// Class name of the instance at `address`.
    fn class_of(&self, address: i32) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalVar {
    pub name: String,
    pub ty: Type,
    pub value: Value,
}

/// Attribute defaults of a class, indexed by attribute slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassLayout {
    pub name: String,
    pub defaults: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub type_name: String,
    pub attributes: Vec<Value>,
}

#[derive(Debug, Clone)]
pub struct MemoryStore {
    file_variables: Vec<GlobalVar>,
    file_var_index: HashMap<String, usize>,
    function_labels: HashMap<String, String>,
    method_labels: HashMap<(String, String), String>,
    used_labels: HashSet<String>,
    file_types: Vec<ClassLayout>,
    heap: Vec<Instance>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn internal(message: impl Into<String>) -> Error {
    Error::internal(message)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            file_variables: Vec::new(),
            file_var_index: HashMap::new(),
            function_labels: HashMap::new(),
            method_labels: HashMap::new(),
            used_labels: HashSet::new(),
            file_types: Vec::new(),
            heap: vec![Instance {
                type_name: "None".to_string(),
                attributes: Vec::new(),
            }],
        }
    }

    // ---- globals ----

    /// Adds a global slot holding the zero value of `ty`.
    pub fn declare_global(&mut self, name: &str, ty: &Type) -> usize {
        let slot = self.file_variables.len();
        self.file_var_index.insert(name.to_string(), slot);
        self.file_variables.push(GlobalVar {
            name: name.to_string(),
            ty: ty.clone(),
            value: Value::default_for(ty),
        });
        slot
    }

    pub fn global(&self, name: &str) -> Option<&GlobalVar> {
        self.file_var_index
            .get(name)
            .map(|&slot| &self.file_variables[slot])
    }

    pub fn globals(&self) -> &[GlobalVar] {
        &self.file_variables
    }

    // ---- classes ----

    /// Registers a layout; its index is the class's type code.
    pub fn declare_class(&mut self, layout: ClassLayout) -> usize {
        self.file_types.push(layout);
        self.file_types.len() - 1
    }

    pub fn layout(&self, type_code: usize) -> Option<&ClassLayout> {
        self.file_types.get(type_code)
    }

    pub fn layouts(&self) -> &[ClassLayout] {
        &self.file_types
    }

    // ---- labels ----

    /// Reserves a fresh procedure label derived from `base`: `base`, then
    /// `base1`, `base2`, ...
    pub fn claim_label(&mut self, base: &str) -> String {
        let mut label = base.to_string();
        let mut n = 0;
        while self.used_labels.contains(&label) {
            n += 1;
            label = format!("{}{}", base, n);
        }
        self.used_labels.insert(label.clone());
        label
    }

    pub fn bind_function_label(&mut self, signature: &str, label: String) {
        self.function_labels.insert(signature.to_string(), label);
    }

    pub fn function_label(&self, signature: &str) -> Option<&str> {
        self.function_labels.get(signature).map(String::as_str)
    }

    pub fn bind_method_label(&mut self, class: &str, signature: &str, label: String) {
        self.method_labels
            .insert((class.to_string(), signature.to_string()), label);
    }

    pub fn method_label(&self, class: &str, signature: &str) -> Option<&str> {
        self.method_labels
            .get(&(class.to_string(), signature.to_string()))
            .map(String::as_str)
    }

    // ---- heap ----

    /// Next free heap address; `1 + n` after `n` instantiations.
    pub fn heap_index(&self) -> usize {
        self.heap.len()
    }

    pub fn instance(&self, address: i32) -> Result<&Instance> {
        if address == 0 {
            return Err(Error::new(
                ErrorKind::NullReferenceError,
                "attribute access on None",
            ));
        }
        usize::try_from(address)
            .ok()
            .and_then(|a| self.heap.get(a))
            .ok_or_else(|| internal(format!("invalid heap address {}", address)))
    }

    fn object_value(&self, address: i32) -> Result<Value> {
        if address == 0 {
            return Ok(Value::None);
        }
        let inst = self.instance(address)?;
        Ok(Value::Object {
            class: inst.type_name.clone(),
            address: address as usize,
        })
    }

    /// Reinterprets `word` as a value of the same kind as `current`.
    fn coerce(&self, word: i32, current: &Value) -> Result<Value> {
        match current {
            Value::Num(_) => Ok(Value::Num(word)),
            Value::Bool(_) => Ok(Value::Bool(word != 0)),
            Value::None | Value::Object { .. } => self.object_value(word),
        }
    }

    /// Interprets `word` according to a static type.
    pub fn value_of(&self, word: i32, ty: &Type) -> Result<Value> {
        match ty {
            Type::Number => Ok(Value::Num(word)),
            Type::Bool => Ok(Value::Bool(word != 0)),
            Type::None => Ok(Value::None),
            Type::Class(_) => self.object_value(word),
        }
    }

    fn slot(&self, slot: i32) -> Result<usize> {
        usize::try_from(slot)
            .ok()
            .filter(|&s| s < self.file_variables.len())
            .ok_or_else(|| internal(format!("undeclared global slot {}", slot)))
    }
}

impl HostOps for MemoryStore {
    fn instantiate(&mut self, type_code: i32) -> Result<i32> {
        let layout = usize::try_from(type_code)
            .ok()
            .and_then(|code| self.file_types.get(code))
            .ok_or_else(|| internal(format!("unknown type code {}", type_code)))?;
        let instance = Instance {
            type_name: layout.name.clone(),
            attributes: layout.defaults.clone(),
        };
        let address = self.heap.len();
        self.heap.push(instance);
        tracing::trace!(type_code, address, "instantiate");
        Ok(address as i32)
    }

    fn attribute_get(&mut self, address: i32, index: i32) -> Result<i32> {
        let inst = self.instance(address)?;
        usize::try_from(index)
            .ok()
            .and_then(|i| inst.attributes.get(i))
            .map(Value::to_word)
            .ok_or_else(|| {
                internal(format!(
                    "attribute {} out of range for {}",
                    index, inst.type_name
                ))
            })
    }

    fn attribute_set(&mut self, address: i32, index: i32, word: i32) -> Result<()> {
        let inst = self.instance(address)?;
        let ix = usize::try_from(index)
            .ok()
            .filter(|&i| i < inst.attributes.len())
            .ok_or_else(|| {
                internal(format!(
                    "attribute {} out of range for {}",
                    index, inst.type_name
                ))
            })?;
        let value = self.coerce(word, &inst.attributes[ix])?;
        self.heap[address as usize].attributes[ix] = value;
        Ok(())
    }

    fn global_get(&mut self, slot: i32) -> Result<i32> {
        let slot = self.slot(slot)?;
        Ok(self.file_variables[slot].value.to_word())
    }

    fn global_set(&mut self, slot: i32, word: i32) -> Result<()> {
        let slot = self.slot(slot)?;
        let value = self.coerce(word, &self.file_variables[slot].value)?;
        self.file_variables[slot].value = value;
        Ok(())
    }

    fn class_of(&self, address: i32) -> Result<String> {
        Ok(self.instance(address)?.type_name.clone())
    }
}
