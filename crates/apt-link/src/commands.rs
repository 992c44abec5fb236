//! Command ids used by the configuration compilers and programming protocols.

pub const MOT_SET_DCPIDPARAMS: u16 = 0x04A0;
pub const MOT_SET_EEPROMPARAMS: u16 = 0x04B9;

pub const SET_CARD_TYPE: u16 = 0x4004;
pub const SET_DEVICE_BOARD: u16 = 0x4008;
pub const RESTART_PROCESSOR: u16 = 0x400B;

pub const MOD_SET_JOYSTICK_MAP_IN: u16 = 0x4014;
pub const MOD_SET_JOYSTICK_MAP_OUT: u16 = 0x4017;

pub const SET_STORE_POSITION_DEADBAND: u16 = 0x401D;
pub const SET_STORE_POSITION: u16 = 0x4021;

pub const MCM_SET_HOMEPARAMS: u16 = 0x403E;
pub const MCM_SET_STAGEPARAMS: u16 = 0x4041;
pub const MCM_MOT_SET_LIMSWITCHPARAMS: u16 = 0x4047;
pub const MCM_SET_SHUTTERPARAMS: u16 = 0x4064;

pub const OW_SET_PROGRAMMING: u16 = 0x40EC;
pub const OW_PROGRAM: u16 = 0x40EF;
pub const OW_REQ_PROGRAMMING_SIZE: u16 = 0x40F0;

pub const MCM_SET_ALLOWED_DEVICES: u16 = 0x40F2;
pub const MCM_SET_DEVICE_DETECTION: u16 = 0x40F5;

pub const LUT_SET_INQUIRY: u16 = 0x40F8;
pub const LUT_INQUIRE: u16 = 0x40FC;
pub const LUT_SET_PROGRAMMING: u16 = 0x40FE;
pub const LUT_PROGRAM: u16 = 0x4102;
pub const LUT_FINISH_PROGRAMMING: u16 = 0x4104;
pub const LUT_REQ_PROGRAMMING_SIZE: u16 = 0x4106;

// Replies to the programming requests above.
pub const OW_GET_PROGRAMMING: u16 = 0x40EE;
pub const OW_GET_PROGRAMMING_SIZE: u16 = 0x40F1;
pub const LUT_GET_INQUIRY: u16 = 0x40FB;
pub const LUT_INQUIRE_RES: u16 = 0x40FD;
pub const LUT_RES_PROGRAMMING: u16 = 0x40FF;
pub const LUT_PROGRAM_RES: u16 = 0x4103;
pub const LUT_FINISH_PROGRAMMING_RES: u16 = 0x4105;
pub const LUT_GET_PROGRAMMING_SIZE: u16 = 0x4107;

/// Human-readable name for logs and frame dumps.
pub fn name(id: u16) -> Option<&'static str> {
    Some(match id {
        MOT_SET_DCPIDPARAMS => "MOT_SET_DCPIDPARAMS",
        MOT_SET_EEPROMPARAMS => "MOT_SET_EEPROMPARAMS",
        SET_CARD_TYPE => "SET_CARD_TYPE",
        SET_DEVICE_BOARD => "SET_DEVICE_BOARD",
        RESTART_PROCESSOR => "RESTART_PROCESSOR",
        MOD_SET_JOYSTICK_MAP_IN => "MOD_SET_JOYSTICK_MAP_IN",
        MOD_SET_JOYSTICK_MAP_OUT => "MOD_SET_JOYSTICK_MAP_OUT",
        SET_STORE_POSITION_DEADBAND => "SET_STORE_POSITION_DEADBAND",
        SET_STORE_POSITION => "SET_STORE_POSITION",
        MCM_SET_HOMEPARAMS => "MCM_SET_HOMEPARAMS",
        MCM_SET_STAGEPARAMS => "MCM_SET_STAGEPARAMS",
        MCM_MOT_SET_LIMSWITCHPARAMS => "MCM_MOT_SET_LIMSWITCHPARAMS",
        MCM_SET_SHUTTERPARAMS => "MCM_SET_SHUTTERPARAMS",
        OW_SET_PROGRAMMING => "OW_SET_PROGRAMMING",
        OW_PROGRAM => "OW_PROGRAM",
        OW_REQ_PROGRAMMING_SIZE => "OW_REQ_PROGRAMMING_SIZE",
        MCM_SET_ALLOWED_DEVICES => "MCM_SET_ALLOWED_DEVICES",
        MCM_SET_DEVICE_DETECTION => "MCM_SET_DEVICE_DETECTION",
        LUT_SET_INQUIRY => "LUT_SET_INQUIRY",
        LUT_INQUIRE => "LUT_INQUIRE",
        LUT_SET_PROGRAMMING => "LUT_SET_PROGRAMMING",
        LUT_PROGRAM => "LUT_PROGRAM",
        LUT_FINISH_PROGRAMMING => "LUT_FINISH_PROGRAMMING",
        LUT_REQ_PROGRAMMING_SIZE => "LUT_REQ_PROGRAMMING_SIZE",
        OW_GET_PROGRAMMING => "OW_GET_PROGRAMMING",
        OW_GET_PROGRAMMING_SIZE => "OW_GET_PROGRAMMING_SIZE",
        LUT_GET_INQUIRY => "LUT_GET_INQUIRY",
        LUT_INQUIRE_RES => "LUT_INQUIRE_RES",
        LUT_RES_PROGRAMMING => "LUT_RES_PROGRAMMING",
        LUT_PROGRAM_RES => "LUT_PROGRAM_RES",
        LUT_FINISH_PROGRAMMING_RES => "LUT_FINISH_PROGRAMMING_RES",
        LUT_GET_PROGRAMMING_SIZE => "LUT_GET_PROGRAMMING_SIZE",
        _ => return None,
    })
}
