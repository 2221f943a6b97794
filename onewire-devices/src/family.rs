use bitflags::bitflags;

bitflags! {
    /// What a device family can do.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Capabilities: u8 {
        /// Measures temperature.
        const TEMPERATURE = 1 << 0;
        /// Has user-writable non-volatile (or battery-backed) memory.
        const EEPROM_STORAGE = 1 << 1;
        /// Drives open-drain PIO outputs.
        const SWITCH_CONTROL = 1 << 2;
    }
}

/// Temperature register layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThermometerKind {
    /// DS18S20: fixed 9 bit register in 0.5 °C steps, refined with COUNT_REMAIN.
    HalfDegree,
    /// DS18B20 and relatives: 9 to 12 bit resolution set in the configuration register.
    Programmable,
    /// DS1921 Thermochron: no scratchpad, an 8 bit register in the memory mapped register
    /// page whose scale depends on the part version encoded in the serial number.
    Thermochron,
}

/// Memory organisation of an EEPROM family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryLayout {
    /// Bytes of user memory.
    pub size: u16,
    /// Scratchpad size; writes never cross a page.
    pub page: u16,
    /// Copy Scratchpad command byte.
    pub copy_cmd: u8,
    /// Programming time after a copy, in milliseconds.
    pub program_ms: u32,
    /// The scratchpad only takes whole pages (DS2431 rows).
    pub whole_pages: bool,
}

/// PIO command set of a switch family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchLayout {
    /// PIO Access Write command byte.
    pub write_cmd: u8,
}

/// A 1-Wire family code and what is known about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Family {
    /// Family code, the first byte of the ROM.
    pub code: u8,
    /// Part name.
    pub name: &'static str,
    /// Capability tags.
    pub capabilities: Capabilities,
    /// Thermometer register layout, for [`Capabilities::TEMPERATURE`].
    pub thermometer: Option<ThermometerKind>,
    /// Memory layout, for [`Capabilities::EEPROM_STORAGE`].
    pub memory: Option<MemoryLayout>,
    /// PIO commands, for [`Capabilities::SWITCH_CONTROL`].
    pub switch: Option<SwitchLayout>,
}

const fn plain(code: u8, name: &'static str) -> Family {
    Family {
        code,
        name,
        capabilities: Capabilities::empty(),
        thermometer: None,
        memory: None,
        switch: None,
    }
}

const fn thermometer(code: u8, name: &'static str, kind: ThermometerKind) -> Family {
    Family {
        capabilities: Capabilities::TEMPERATURE,
        thermometer: Some(kind),
        ..plain(code, name)
    }
}

const fn eeprom(code: u8, name: &'static str, layout: MemoryLayout) -> Family {
    Family {
        capabilities: Capabilities::EEPROM_STORAGE,
        memory: Some(layout),
        ..plain(code, name)
    }
}

const DS2423_MEMORY: MemoryLayout = MemoryLayout {
    size: 512,
    page: 32,
    copy_cmd: 0x5a,
    program_ms: 5,
    whole_pages: false,
};

/// Copy Scratchpad is 55h on the DS2433, unlike the 5Ah of the DS2423.
pub(crate) const DS2433_MEMORY: MemoryLayout = MemoryLayout {
    copy_cmd: 0x55,
    ..DS2423_MEMORY
};

/// General purpose SRAM of the DS1921, pages 0 to 15.
const DS1921_MEMORY: MemoryLayout = MemoryLayout {
    size: 512,
    page: 32,
    copy_cmd: 0x55,
    program_ms: 1,
    whole_pages: false,
};

/// Every family with a known command set, ordered by family code.
pub static FAMILIES: &[Family] = &[
    plain(0x01, "DS2401"),
    plain(0x02, "DS1425"),
    thermometer(0x10, "DS18S20", ThermometerKind::HalfDegree),
    eeprom(0x1d, "DS2423", DS2423_MEMORY),
    Family {
        capabilities: Capabilities::TEMPERATURE.union(Capabilities::EEPROM_STORAGE),
        thermometer: Some(ThermometerKind::Thermochron),
        memory: Some(DS1921_MEMORY),
        ..plain(0x21, "DS1921")
    },
    thermometer(0x22, "DS1822", ThermometerKind::Programmable),
    eeprom(0x23, "DS2433", DS2433_MEMORY),
    thermometer(0x28, "DS18B20", ThermometerKind::Programmable),
    eeprom(
        0x2d,
        "DS2431",
        MemoryLayout {
            size: 128,
            page: 8,
            copy_cmd: 0x55,
            program_ms: 13,
            whole_pages: true,
        },
    ),
    Family {
        capabilities: Capabilities::SWITCH_CONTROL,
        switch: Some(SwitchLayout { write_cmd: 0x5a }),
        ..plain(0x3a, "DS2413")
    },
    thermometer(0x3b, "DS1825", ThermometerKind::Programmable),
    Family {
        capabilities: Capabilities::TEMPERATURE.union(Capabilities::SWITCH_CONTROL),
        thermometer: Some(ThermometerKind::Programmable),
        switch: Some(SwitchLayout { write_cmd: 0xa5 }),
        ..plain(0x42, "DS28EA00")
    },
];

impl Family {
    /// Looks up a family code.
    pub fn lookup(code: u8) -> Option<&'static Family> {
        FAMILIES
            .binary_search_by_key(&code, |family| family.code)
            .ok()
            .map(|index| &FAMILIES[index])
    }

    /// Capabilities of `code`, empty for unknown families.
    pub fn capabilities_of(code: u8) -> Capabilities {
        Self::lookup(code).map_or(Capabilities::empty(), |family| family.capabilities)
    }
}
