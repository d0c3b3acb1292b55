#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SyntaxKind {
    // Token kinds.
    NAME,
    NUMBER,
    STRING,
    OP,
    NEWLINE,
    INDENT,
    DEDENT,
    ERROR_DEDENT,
    ENDMARKER,
    ERRORTOKEN,

    // Node kinds.
    MODULE,
    SUITE,
    FUNCDEF,
    CLASSDEF,
    IF_STMT,
    WHILE_STMT,
    FOR_STMT,
    TRY_STMT,
    WITH_STMT,
    SIMPLE_STMT,
    ERROR_NODE,
    ERROR_LEAF,
}

impl SyntaxKind {
    /// Indentation bookkeeping tokens. They never carry text or prefix.
    pub fn is_indentation(self) -> bool {
        matches!(self, Self::INDENT | Self::DEDENT | Self::ERROR_DEDENT)
    }

    pub fn is_error(self) -> bool {
        matches!(self, Self::ERROR_NODE | Self::ERROR_LEAF)
    }

    /// Statements whose continuation clauses (`elif`, `else`, `except`,
    /// `finally`) may still follow after their last parsed suite.
    pub fn is_flow(self) -> bool {
        matches!(self, Self::IF_STMT | Self::WHILE_STMT | Self::FOR_STMT | Self::TRY_STMT)
    }
}
