//! Debug-info encoding constants for the v2+ format, plus the v1 values the
//! legacy path understands.

// Tags
pub const TAG_ARRAY_TYPE: u64 = 0x01;
pub const TAG_CLASS_TYPE: u64 = 0x02;
pub const TAG_ENUMERATION_TYPE: u64 = 0x04;
pub const TAG_FORMAL_PARAMETER: u64 = 0x05;
pub const TAG_MEMBER: u64 = 0x0D;
pub const TAG_POINTER_TYPE: u64 = 0x0F;
pub const TAG_COMPILE_UNIT: u64 = 0x11;
pub const TAG_STRUCTURE_TYPE: u64 = 0x13;
pub const TAG_SUBROUTINE_TYPE: u64 = 0x15;
pub const TAG_TYPEDEF: u64 = 0x16;
pub const TAG_UNION_TYPE: u64 = 0x17;
pub const TAG_SUBRANGE_TYPE: u64 = 0x21;
pub const TAG_BASE_TYPE: u64 = 0x24;
pub const TAG_CONST_TYPE: u64 = 0x26;
pub const TAG_ENUMERATOR: u64 = 0x28;
pub const TAG_SUBPROGRAM: u64 = 0x2E;
pub const TAG_VARIABLE: u64 = 0x34;
pub const TAG_VOLATILE_TYPE: u64 = 0x35;

// Attributes
pub const AT_SIBLING: u64 = 0x01;
pub const AT_LOCATION: u64 = 0x02;
pub const AT_NAME: u64 = 0x03;
pub const AT_BYTE_SIZE: u64 = 0x0B;
pub const AT_BIT_OFFSET: u64 = 0x0C;
pub const AT_BIT_SIZE: u64 = 0x0D;
pub const AT_STMT_LIST: u64 = 0x10;
pub const AT_LOW_PC: u64 = 0x11;
pub const AT_HIGH_PC: u64 = 0x12;
pub const AT_CONST_VALUE: u64 = 0x1C;
pub const AT_LOWER_BOUND: u64 = 0x22;
pub const AT_UPPER_BOUND: u64 = 0x2F;
pub const AT_ABSTRACT_ORIGIN: u64 = 0x31;
pub const AT_DATA_MEMBER_LOCATION: u64 = 0x38;
pub const AT_DECLARATION: u64 = 0x3C;
pub const AT_ENCODING: u64 = 0x3E;
pub const AT_EXTERNAL: u64 = 0x3F;
pub const AT_TYPE: u64 = 0x49;
pub const AT_DATA_LOCATION: u64 = 0x50;

// Forms
pub const FORM_ADDR: u64 = 0x01;
pub const FORM_BLOCK2: u64 = 0x03;
pub const FORM_BLOCK4: u64 = 0x04;
pub const FORM_DATA2: u64 = 0x05;
pub const FORM_DATA4: u64 = 0x06;
pub const FORM_DATA8: u64 = 0x07;
pub const FORM_STRING: u64 = 0x08;
pub const FORM_BLOCK: u64 = 0x09;
pub const FORM_BLOCK1: u64 = 0x0A;
pub const FORM_DATA1: u64 = 0x0B;
pub const FORM_FLAG: u64 = 0x0C;
pub const FORM_SDATA: u64 = 0x0D;
pub const FORM_STRP: u64 = 0x0E;
pub const FORM_UDATA: u64 = 0x0F;
pub const FORM_REF_ADDR: u64 = 0x10;
pub const FORM_REF1: u64 = 0x11;
pub const FORM_REF2: u64 = 0x12;
pub const FORM_REF4: u64 = 0x13;
pub const FORM_REF8: u64 = 0x14;
pub const FORM_REF_UDATA: u64 = 0x15;
pub const FORM_INDIRECT: u64 = 0x16;

// Base-type encodings
pub const ATE_ADDRESS: u64 = 0x01;
pub const ATE_BOOLEAN: u64 = 0x02;
pub const ATE_FLOAT: u64 = 0x04;
pub const ATE_SIGNED: u64 = 0x05;
pub const ATE_SIGNED_CHAR: u64 = 0x06;
pub const ATE_UNSIGNED: u64 = 0x07;
pub const ATE_UNSIGNED_CHAR: u64 = 0x08;

// Location-expression opcodes
pub const OP_ADDR: u8 = 0x03;
pub const OP_DEREF: u8 = 0x06;
pub const OP_CONST1U: u8 = 0x08;
pub const OP_CONST1S: u8 = 0x09;
pub const OP_CONST2U: u8 = 0x0A;
pub const OP_CONST2S: u8 = 0x0B;
pub const OP_CONST4U: u8 = 0x0C;
pub const OP_CONST4S: u8 = 0x0D;
pub const OP_CONST8U: u8 = 0x0E;
pub const OP_CONST8S: u8 = 0x0F;
pub const OP_CONSTU: u8 = 0x10;
pub const OP_CONSTS: u8 = 0x11;
pub const OP_MINUS: u8 = 0x1C;
pub const OP_PLUS: u8 = 0x22;
pub const OP_PLUS_UCONST: u8 = 0x23;
pub const OP_LIT0: u8 = 0x30;
pub const OP_LIT31: u8 = 0x4F;
pub const OP_REG0: u8 = 0x50;
pub const OP_REG31: u8 = 0x6F;
pub const OP_BREG0: u8 = 0x70;
pub const OP_BREG31: u8 = 0x8F;
pub const OP_REGX: u8 = 0x90;
pub const OP_FBREG: u8 = 0x91;

/// Array subrange bound meaning "size unknown; recover it from the symbol".
pub const UNKNOWN_UPPER_BOUND: u64 = 0xFFFF_FFFF;

// Legacy (v1) tag values
pub const V1_TAG_ARRAY_TYPE: u16 = 0x0001;
pub const V1_TAG_ENUMERATION_TYPE: u16 = 0x0004;
pub const V1_TAG_GLOBAL_SUBROUTINE: u16 = 0x0006;
pub const V1_TAG_GLOBAL_VARIABLE: u16 = 0x0007;
pub const V1_TAG_LOCAL_VARIABLE: u16 = 0x000C;
pub const V1_TAG_MEMBER: u16 = 0x000D;
pub const V1_TAG_POINTER_TYPE: u16 = 0x000F;
pub const V1_TAG_COMPILE_UNIT: u16 = 0x0011;
pub const V1_TAG_STRUCTURE_TYPE: u16 = 0x0013;
pub const V1_TAG_SUBROUTINE: u16 = 0x0014;
pub const V1_TAG_SUBROUTINE_TYPE: u16 = 0x0015;
pub const V1_TAG_TYPEDEF: u16 = 0x0016;
pub const V1_TAG_UNION_TYPE: u16 = 0x0017;

// Legacy (v1) attribute name halves (low nibble carries the form)
pub const V1_AT_SIBLING: u16 = 0x001;
pub const V1_AT_LOCATION: u16 = 0x002;
pub const V1_AT_NAME: u16 = 0x003;
pub const V1_AT_FUND_TYPE: u16 = 0x005;
pub const V1_AT_MOD_FUND_TYPE: u16 = 0x006;
pub const V1_AT_USER_DEF_TYPE: u16 = 0x007;
pub const V1_AT_MOD_U_D_TYPE: u16 = 0x008;
pub const V1_AT_BYTE_SIZE: u16 = 0x00B;
pub const V1_AT_MEMBER: u16 = 0x014;

// Legacy (v1) forms
pub const V1_FORM_ADDR: u16 = 0x1;
pub const V1_FORM_REF: u16 = 0x2;
pub const V1_FORM_BLOCK2: u16 = 0x3;
pub const V1_FORM_BLOCK4: u16 = 0x4;
pub const V1_FORM_DATA2: u16 = 0x5;
pub const V1_FORM_DATA4: u16 = 0x6;
pub const V1_FORM_DATA8: u16 = 0x7;
pub const V1_FORM_STRING: u16 = 0x8;

// Legacy (v1) fundamental types
pub const V1_FT_CHAR: u16 = 0x01;
pub const V1_FT_SIGNED_CHAR: u16 = 0x02;
pub const V1_FT_UNSIGNED_CHAR: u16 = 0x03;
pub const V1_FT_SHORT: u16 = 0x04;
pub const V1_FT_SIGNED_SHORT: u16 = 0x05;
pub const V1_FT_UNSIGNED_SHORT: u16 = 0x06;
pub const V1_FT_INTEGER: u16 = 0x07;
pub const V1_FT_SIGNED_INTEGER: u16 = 0x08;
pub const V1_FT_UNSIGNED_INTEGER: u16 = 0x09;
pub const V1_FT_LONG: u16 = 0x0A;
pub const V1_FT_SIGNED_LONG: u16 = 0x0B;
pub const V1_FT_UNSIGNED_LONG: u16 = 0x0C;
pub const V1_FT_POINTER: u16 = 0x0D;
pub const V1_FT_FLOAT: u16 = 0x0E;
pub const V1_FT_DBL_PREC_FLOAT: u16 = 0x0F;
pub const V1_FT_VOID: u16 = 0x14;
pub const V1_FT_BOOLEAN: u16 = 0x15;

// Legacy (v1) location atoms
pub const V1_OP_REG: u8 = 0x01;
pub const V1_OP_BASEREG: u8 = 0x02;
pub const V1_OP_ADDR: u8 = 0x03;
pub const V1_OP_CONST: u8 = 0x04;
pub const V1_OP_DEREF2: u8 = 0x05;
pub const V1_OP_DEREF: u8 = 0x06;
pub const V1_OP_ADD: u8 = 0x07;
